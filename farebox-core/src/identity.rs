use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of roles the engine distinguishes. Authorization beyond
/// ownership checks lives with the identity collaborator, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(Role::Customer),
            "ADMIN" => Ok(Role::Admin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The resolved caller, as handed to us by the identity collaborator.
/// Opaque id plus role; the engine trusts both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(id, Role::Customer)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}
