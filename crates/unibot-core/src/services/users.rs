use std::{collections::HashMap, fmt, str::FromStr, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{domain::UserId, errors::Error, services::lock, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Applicant,
    Student,
    Employee,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Applicant => "applicant",
            Role::Student => "student",
            Role::Employee => "employee",
            Role::Manager => "manager",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Applicant => "Applicant",
            Role::Student => "Student",
            Role::Employee => "Employee",
            Role::Manager => "Manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "applicant" => Ok(Role::Applicant),
            "student" => Ok(Role::Student),
            "employee" => Ok(Role::Employee),
            "manager" => Ok(Role::Manager),
            other => Err(Error::Config(format!("unknown role {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub age: u8,
    pub gender: String,
    pub email: String,
    pub role: Role,
    pub moodle_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub age: u8,
    pub gender: String,
    pub email: String,
    pub role: Role,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<User>>;
    /// Fails if a user with this id already exists.
    async fn create(&self, user: NewUser) -> Result<User>;
    async fn list(&self) -> Result<Vec<User>>;
    async fn set_moodle_token(&self, id: UserId, token: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get(&self, id: UserId) -> Result<Option<User>> {
        Ok(lock(&self.users, "users")?.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User> {
        let mut users = lock(&self.users, "users")?;
        if users.contains_key(&new.id) {
            return Err(Error::Service(format!("user {} already exists", new.id)));
        }
        let user = User {
            id: new.id,
            first_name: new.first_name,
            last_name: new.last_name,
            age: new.age,
            gender: new.gender,
            email: new.email,
            role: new.role,
            moodle_token: None,
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut all: Vec<User> = lock(&self.users, "users")?.values().cloned().collect();
        all.sort_by_key(|u| u.id);
        Ok(all)
    }

    async fn set_moodle_token(&self, id: UserId, token: &str) -> Result<()> {
        let mut users = lock(&self.users, "users")?;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("user {id}")))?;
        user.moodle_token = Some(token.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(id: i64, role: Role) -> NewUser {
        NewUser {
            id: UserId(id),
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            age: 20,
            gender: "female".into(),
            email: "ann@uni.edu".into(),
            role,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let dir = InMemoryUserDirectory::new();
        dir.create(new_user(1, Role::Student)).await.unwrap();
        let err = dir.create(new_user(1, Role::Manager)).await.unwrap_err();
        assert!(matches!(err, Error::Service(_)));
        assert_eq!(dir.get(UserId(1)).await.unwrap().unwrap().role, Role::Student);
    }

    #[tokio::test]
    async fn moodle_token_needs_existing_user() {
        let dir = InMemoryUserDirectory::new();
        assert!(matches!(
            dir.set_moodle_token(UserId(5), "t").await.unwrap_err(),
            Error::NotFound(_)
        ));
        dir.create(new_user(5, Role::Student)).await.unwrap();
        dir.set_moodle_token(UserId(5), "t").await.unwrap();
        assert_eq!(
            dir.get(UserId(5)).await.unwrap().unwrap().moodle_token.as_deref(),
            Some("t")
        );
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("dean".parse::<Role>().is_err());
    }
}
