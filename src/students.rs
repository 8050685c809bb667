use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query};
use axum::headers::Cookie;
use axum::routing::get;
use axum::{Extension, Json, Router, TypedHeader};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::authorize;
use crate::models::{Student, StudentFields};
use crate::{breaks, created, proceeds, AppState, Error, Payload};

/// Record routes. Callers put [`crate::auth::gate`] in front; each handler
/// still checks the session itself.
pub fn routes() -> Router {
    Router::new()
        .route("/students", get(list_students).post(create_student))
        .route(
            "/students/:id",
            get(read_student).put(update_student).delete(delete_student),
        )
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Listing {
    One(Student),
    Many(Vec<Student>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Deleted {
    message: &'static str,
    id: Uuid,
}

/// Unparseable ids cannot name a stored record, so they are simply not found.
fn parse_id(raw: &str) -> Result<Uuid, Error> {
    Uuid::from_str(raw).map_err(|_| student_not_found())
}

fn student_not_found() -> Error {
    Error::not_found("Student not found")
}

fn validate(student: &Student) -> Result<(), Error> {
    let fields = student.missing_fields();
    if fields.is_empty() {
        return Ok(());
    }
    Err(Error::ValidationFailed {
        message: format!("Missing required fields: {}", fields.join(", ")),
        fields,
    })
}

pub async fn list_students(
    Extension(state): Extension<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Query(query): Query<ListQuery>,
) -> Payload<Listing> {
    authorize(cookie, &state.tokens)?;

    if let Some(id) = query.id.as_deref().filter(|id| !id.is_empty()) {
        let id = parse_id(id)?;
        return match state.stores.students.find_student(id).await? {
            Some(student) => proceeds(Listing::One(student)),
            None => breaks(student_not_found()),
        };
    }

    let term = query.q.as_deref().filter(|q| !q.is_empty());
    let students = state.stores.students.list_students(term).await?;
    proceeds(Listing::Many(students))
}

pub async fn read_student(
    Extension(state): Extension<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Path(id): Path<String>,
) -> Payload<Student> {
    authorize(cookie, &state.tokens)?;
    let id = parse_id(&id)?;

    match state.stores.students.find_student(id).await? {
        Some(student) => proceeds(student),
        None => breaks(student_not_found()),
    }
}

pub async fn create_student(
    Extension(state): Extension<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    payload: Result<Json<StudentFields>, JsonRejection>,
) -> Payload<Student> {
    let identity = authorize(cookie, &state.tokens)?;
    let Json(fields) = payload?;

    let mut student = Student::blank(Uuid::new_v4(), Utc::now());
    student.apply(fields);
    validate(&student)?;

    state.stores.students.insert_student(&student).await?;
    log::info!(
        "Account {} created student {} ({})",
        identity.account_id,
        student.id,
        student.admission_number
    );
    created(student)
}

pub async fn update_student(
    Extension(state): Extension<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Path(id): Path<String>,
    payload: Result<Json<StudentFields>, JsonRejection>,
) -> Payload<Student> {
    let identity = authorize(cookie, &state.tokens)?;
    let id = parse_id(&id)?;
    let Json(fields) = payload?;

    let mut student = match state.stores.students.find_student(id).await? {
        Some(student) => student,
        None => return breaks(student_not_found()),
    };
    student.apply(fields);
    validate(&student)?;
    student.updated_at = Utc::now();

    if !state.stores.students.replace_student(&student).await? {
        // deleted between the read and the write
        return breaks(student_not_found());
    }
    log::info!("Account {} updated student {}", identity.account_id, student.id);
    proceeds(student)
}

pub async fn delete_student(
    Extension(state): Extension<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Path(id): Path<String>,
) -> Payload<Deleted> {
    let identity = authorize(cookie, &state.tokens)?;
    let id = parse_id(&id)?;

    if !state.stores.students.delete_student(id).await? {
        return breaks(student_not_found());
    }
    log::info!("Account {} deleted student {}", identity.account_id, id);
    proceeds(Deleted {
        message: "Deleted successfully",
        id,
    })
}
