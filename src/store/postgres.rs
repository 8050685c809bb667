use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, StoreError, StudentStore};
use crate::models::{Account, Student, StudentRow};

const UNIQUE_VIOLATION: &str = "23505";

const CREATE_ACCOUNTS: &str = "CREATE TABLE IF NOT EXISTS accounts (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
)";

const CREATE_STUDENTS: &str = "CREATE TABLE IF NOT EXISTS students (
    id UUID PRIMARY KEY,
    admission_number TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    place TEXT NOT NULL,
    address TEXT NOT NULL,
    phone TEXT NOT NULL,
    father_name TEXT NOT NULL,
    father_phone TEXT NOT NULL,
    education_year TEXT NOT NULL,
    education_university TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'moved', 'completed')),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)";

const SEARCH_STUDENTS: &str = "SELECT * FROM students WHERE
    admission_number ILIKE $1 OR name ILIKE $1 OR place ILIKE $1 OR address ILIKE $1
    OR phone ILIKE $1 OR father_name ILIKE $1 OR father_phone ILIKE $1
    OR education_year ILIKE $1 OR education_university ILIKE $1
    ORDER BY admission_number COLLATE \"C\" ASC";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.prepare_schema().await?;
        Ok(store)
    }

    async fn prepare_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_ACCOUNTS).execute(&self.pool).await?;
        sqlx::query(CREATE_STUDENTS).execute(&self.pool).await?;
        Ok(())
    }
}

/// Maps a unique-constraint failure onto `field`, anything else stays a
/// database error.
fn conflict_on(field: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| {
        let unique = matches!(
            &err,
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
        );
        if unique {
            StoreError::Conflict { field }
        } else {
            StoreError::Database(err)
        }
    }
}

fn into_student(row: StudentRow) -> Result<Student, StoreError> {
    Student::try_from(row).map_err(StoreError::Corrupted)
}

/// `%term%` for ILIKE, with the pattern metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let account =
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1 LIMIT 1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(account)
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accounts (id, email, password_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict_on("email"))?;
        Ok(())
    }
}

#[async_trait]
impl StudentStore for PgStore {
    async fn list_students(&self, term: Option<&str>) -> Result<Vec<Student>, StoreError> {
        let rows = match term {
            Some(term) => {
                sqlx::query_as::<_, StudentRow>(SEARCH_STUDENTS)
                    .bind(like_pattern(term))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, StudentRow>(
                    "SELECT * FROM students ORDER BY admission_number COLLATE \"C\" ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(into_student).collect()
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        sqlx::query_as::<_, StudentRow>("SELECT * FROM students WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(into_student)
            .transpose()
    }

    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO students VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)")
            .bind(student.id)
            .bind(&student.admission_number)
            .bind(&student.name)
            .bind(&student.place)
            .bind(&student.address)
            .bind(&student.phone)
            .bind(&student.father_name)
            .bind(&student.father_phone)
            .bind(&student.education.year)
            .bind(&student.education.university)
            .bind(student.status.as_str())
            .bind(student.created_at)
            .bind(student.updated_at)
            .execute(&self.pool)
            .await
            .map_err(conflict_on("admissionNumber"))?;
        Ok(())
    }

    async fn replace_student(&self, student: &Student) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE students SET admission_number = $2, name = $3, place = $4, address = $5,
                phone = $6, father_name = $7, father_phone = $8, education_year = $9,
                education_university = $10, status = $11, updated_at = $12
             WHERE id = $1",
        )
        .bind(student.id)
        .bind(&student.admission_number)
        .bind(&student.name)
        .bind(&student.place)
        .bind(&student.address)
        .bind(&student.phone)
        .bind(&student.father_name)
        .bind(&student.father_phone)
        .bind(&student.education.year)
        .bind(&student.education.university)
        .bind(student.status.as_str())
        .bind(student.updated_at)
        .execute(&self.pool)
        .await
        .map_err(conflict_on("admissionNumber"))?;
        Ok(res.rows_affected() >= 1)
    }

    async fn delete_student(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() >= 1)
    }
}
