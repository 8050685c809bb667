use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registered user. Not `Serialize`: the hash must never leave the server.
#[derive(Clone, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    #[serde(alias = "Moved")]
    Moved,
    Completed,
}

impl Default for Status {
    fn default() -> Self {
        Status::Active
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Moved => "moved",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "moved" | "Moved" => Ok(Status::Moved),
            "completed" => Ok(Status::Completed),
            other => Err(format!("unknown student status `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Education {
    pub year: String,
    pub university: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub admission_number: String,
    pub name: String,
    pub place: String,
    pub address: String,
    pub phone: String,
    pub father_name: String,
    pub father_phone: String,
    pub education: Education,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// An empty record, to be filled through [`Student::apply`].
    pub fn blank(id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            admission_number: String::new(),
            name: String::new(),
            place: String::new(),
            address: String::new(),
            phone: String::new(),
            father_name: String::new(),
            father_phone: String::new(),
            education: Education::default(),
            status: Status::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges every provided field into the record.
    pub fn apply(&mut self, fields: StudentFields) {
        let StudentFields {
            admission_number,
            name,
            place,
            address,
            phone,
            father_name,
            father_phone,
            education,
            status,
        } = fields;

        merge(&mut self.admission_number, admission_number);
        merge(&mut self.name, name);
        merge(&mut self.place, place);
        merge(&mut self.address, address);
        merge(&mut self.phone, phone);
        merge(&mut self.father_name, father_name);
        merge(&mut self.father_phone, father_phone);
        if let Some(education) = education {
            merge(&mut self.education.year, education.year);
            merge(&mut self.education.university, education.university);
        }
        if let Some(status) = status {
            self.status = status;
        }
    }

    /// Searchable fields in wire naming, in match order.
    pub fn searchable_fields(&self) -> [(&'static str, &str); 9] {
        [
            ("admissionNumber", self.admission_number.as_str()),
            ("name", self.name.as_str()),
            ("place", self.place.as_str()),
            ("address", self.address.as_str()),
            ("phone", self.phone.as_str()),
            ("fatherName", self.father_name.as_str()),
            ("fatherPhone", self.father_phone.as_str()),
            ("education.year", self.education.year.as_str()),
            ("education.university", self.education.university.as_str()),
        ]
    }

    /// Required fields that are empty or whitespace-only.
    pub fn missing_fields(&self) -> Vec<String> {
        self.searchable_fields()
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field.to_string())
            .collect()
    }

    /// Case-insensitive substring match across every searchable field.
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        self.searchable_fields()
            .iter()
            .any(|(_, value)| value.to_lowercase().contains(needle))
    }
}

fn merge(slot: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Editable fields as sent by clients on create and update. Absent fields are
/// left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFields {
    pub admission_number: Option<String>,
    pub name: Option<String>,
    pub place: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub father_name: Option<String>,
    pub father_phone: Option<String>,
    pub education: Option<EducationFields>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EducationFields {
    pub year: Option<String>,
    pub university: Option<String>,
}

/// Flat row layout of the `students` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentRow {
    pub id: Uuid,
    pub admission_number: String,
    pub name: String,
    pub place: String,
    pub address: String,
    pub phone: String,
    pub father_name: String,
    pub father_phone: String,
    pub education_year: String,
    pub education_university: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<StudentRow> for Student {
    type Error = String;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        Ok(Student {
            id: row.id,
            admission_number: row.admission_number,
            name: row.name,
            place: row.place,
            address: row.address,
            phone: row.phone,
            father_name: row.father_name,
            father_phone: row.father_phone,
            education: Education {
                year: row.education_year,
                university: row.education_university,
            },
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
