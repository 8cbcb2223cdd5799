//! The acting person behind an operation.
//!
//! Identity resolution happens outside the core; transports hand over an already-resolved
//! [`Actor`]. The core only checks privilege levels and, for commits, records who acted.

use crate::error::{CoreError, CoreResult};
use crate::ids::PersonId;
use nwd_types::{EmailAddress, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Privilege levels, ordered from least to most privileged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    /// Instructors, coaches, assessors and students.
    Member,
    /// Administrator of one sailing location.
    LocationAdmin,
    /// NWD secretariat.
    SystemAdmin,
}

impl Privilege {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::LocationAdmin => "location_admin",
            Self::SystemAdmin => "system_admin",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privilege {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "member" => Ok(Self::Member),
            "location_admin" => Ok(Self::LocationAdmin),
            "system_admin" => Ok(Self::SystemAdmin),
            other => Err(CoreError::InvalidInput(format!(
                "unknown privilege '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub person: PersonId,
    pub name: NonEmptyText,
    pub email: Option<EmailAddress>,
    pub privilege: Privilege,
}

impl Actor {
    pub fn new(person: PersonId, name: &str, privilege: Privilege) -> CoreResult<Self> {
        Ok(Self {
            person,
            name: NonEmptyText::new(name)?,
            email: None,
            privilege,
        })
    }

    pub fn with_email(mut self, email: EmailAddress) -> Self {
        self.email = Some(email);
        self
    }

    pub fn has(&self, min: Privilege) -> bool {
        self.privilege >= min
    }

    /// Fails with [`CoreError::PermissionDenied`] unless the actor holds at least `min`.
    pub fn require(&self, min: Privilege, action: &str) -> CoreResult<()> {
        if self.has(min) {
            Ok(())
        } else {
            tracing::debug!(
                actor = %self.person,
                privilege = %self.privilege,
                required = %min,
                action,
                "privilege check failed"
            );
            Err(CoreError::PermissionDenied(format!(
                "{action} requires {min} privilege"
            )))
        }
    }
}
