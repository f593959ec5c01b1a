use std::fmt;
use std::str::FromStr;

/// Staff portal roles. Must match the `users_role_check` constraint in the
/// initial migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Marketing,
    Lender,
    Referrer,
}

/// Allow-lists used by handlers. A role outside the list gets 403.
pub const ADMIN: &[Role] = &[Role::Admin];
pub const MANAGEMENT: &[Role] = &[Role::Admin, Role::Manager];
pub const STAFF: &[Role] = &[Role::Admin, Role::Manager, Role::Staff];
pub const CRM: &[Role] = &[Role::Admin, Role::Manager, Role::Staff, Role::Marketing];
pub const PORTAL: &[Role] = &[
    Role::Admin,
    Role::Manager,
    Role::Staff,
    Role::Marketing,
    Role::Lender,
    Role::Referrer,
];

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Staff => "staff",
            Self::Marketing => "marketing",
            Self::Lender => "lender",
            Self::Referrer => "referrer",
        }
    }

    pub fn allowed(self, group: &[Role]) -> bool {
        group.contains(&self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "staff" => Ok(Self::Staff),
            "marketing" => Ok(Self::Marketing),
            "lender" => Ok(Self::Lender),
            "referrer" => Ok(Self::Referrer),
            other => anyhow::bail!("unknown role: {other}"),
        }
    }
}

impl serde::Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
