use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, StoreError, StudentStore};
use crate::models::{Account, Student};

/// In-process backend. Uniqueness is checked under the write lock, so
/// concurrent writers see the same conflicts Postgres would report.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
    students: RwLock<HashMap<Uuid, Student>>,
}

#[cfg(test)]
impl MemoryStore {
    pub async fn student_count(&self) -> usize {
        self.students.read().await.len()
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict { field: "email" });
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }
}

#[async_trait]
impl StudentStore for MemoryStore {
    async fn list_students(&self, term: Option<&str>) -> Result<Vec<Student>, StoreError> {
        let students = self.students.read().await;
        let needle = term.map(str::to_lowercase);
        let mut found: Vec<Student> = students
            .values()
            .filter(|s| needle.as_deref().map_or(true, |n| s.matches(n)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.admission_number.cmp(&b.admission_number));
        Ok(found)
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        Ok(self.students.read().await.get(&id).cloned())
    }

    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        let mut students = self.students.write().await;
        if students
            .values()
            .any(|s| s.admission_number == student.admission_number)
        {
            return Err(StoreError::Conflict {
                field: "admissionNumber",
            });
        }
        students.insert(student.id, student.clone());
        Ok(())
    }

    async fn replace_student(&self, student: &Student) -> Result<bool, StoreError> {
        let mut students = self.students.write().await;
        if !students.contains_key(&student.id) {
            return Ok(false);
        }
        if students
            .values()
            .any(|s| s.id != student.id && s.admission_number == student.admission_number)
        {
            return Err(StoreError::Conflict {
                field: "admissionNumber",
            });
        }
        students.insert(student.id, student.clone());
        Ok(true)
    }

    async fn delete_student(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.students.write().await.remove(&id).is_some())
    }
}
