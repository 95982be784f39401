//! Typed administrative statements and existence probes.
//!
//! Every statement the provisioner issues is a [`Statement`] value. Names are
//! [`Identifier`]s, so nothing unvalidated can reach DDL text. Values that
//! cannot be validated (passwords, extension names) are never interpolated on
//! the client: they travel as bound parameters into a server-side
//! `format('%I' / '%L')` call whose result is then executed.

use std::fmt;

use crate::error::{PostgresError, Result};
use crate::identifier::Identifier;

/// A password that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Wraps a plaintext password.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The plaintext value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(****)")
    }
}

/// An extension name, checked for emptiness and length only; it is always
/// quoted server-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionName(String);

impl ExtensionName {
    /// Validates an extension name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for empty names, names longer than 63
    /// bytes, or names containing NUL.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() > 63 || name.contains('\0') {
            return Err(PostgresError::config(format!(
                "invalid extension name {name:?}"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// The bare name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mutating administrative statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateRole { role: Identifier, password: Password },
    AlterRolePassword { role: Identifier, password: Password },
    CreateDatabase { database: Identifier, owner: Identifier },
    DropDatabase { database: Identifier },
    DropRole { role: Identifier },
    /// `GRANT role TO member`
    GrantRole { role: Identifier, member: Identifier },
    AlterSchemaOwner { schema: Identifier, owner: Identifier },
    CreateSchema { schema: Identifier, owner: Identifier },
    CreateExtension { extension: ExtensionName },
}

/// How a statement is sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sql {
    /// Executed as-is.
    Direct(String),
    /// A `SELECT format(...)` query with bound parameters; its single text
    /// result is the statement to execute.
    Formatted {
        query: &'static str,
        params: Vec<String>,
    },
}

impl Statement {
    /// Short operation name for logs.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateRole { .. } => "create_role",
            Self::AlterRolePassword { .. } => "alter_role_password",
            Self::CreateDatabase { .. } => "create_database",
            Self::DropDatabase { .. } => "drop_database",
            Self::DropRole { .. } => "drop_role",
            Self::GrantRole { .. } => "grant_role",
            Self::AlterSchemaOwner { .. } => "alter_schema_owner",
            Self::CreateSchema { .. } => "create_schema",
            Self::CreateExtension { .. } => "create_extension",
        }
    }

    /// Renders the statement for the wire.
    #[must_use]
    pub fn render(&self) -> Sql {
        match self {
            Self::CreateRole { role, password } => Sql::Formatted {
                query: "SELECT format('CREATE ROLE %I WITH LOGIN PASSWORD %L', $1::text, $2::text)",
                params: vec![role.to_string(), password.expose().to_string()],
            },
            Self::AlterRolePassword { role, password } => Sql::Formatted {
                query: "SELECT format('ALTER ROLE %I WITH LOGIN PASSWORD %L', $1::text, $2::text)",
                params: vec![role.to_string(), password.expose().to_string()],
            },
            Self::CreateDatabase { database, owner } => Sql::Direct(format!(
                "CREATE DATABASE {} OWNER {}",
                database.quoted(),
                owner.quoted()
            )),
            Self::DropDatabase { database } => {
                Sql::Direct(format!("DROP DATABASE {}", database.quoted()))
            }
            Self::DropRole { role } => Sql::Direct(format!("DROP ROLE {}", role.quoted())),
            Self::GrantRole { role, member } => Sql::Direct(format!(
                "GRANT {} TO {}",
                role.quoted(),
                member.quoted()
            )),
            Self::AlterSchemaOwner { schema, owner } => Sql::Direct(format!(
                "ALTER SCHEMA {} OWNER TO {}",
                schema.quoted(),
                owner.quoted()
            )),
            Self::CreateSchema { schema, owner } => Sql::Direct(format!(
                "CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {}",
                schema.quoted(),
                owner.quoted()
            )),
            Self::CreateExtension { extension } => Sql::Formatted {
                query: "SELECT format('CREATE EXTENSION IF NOT EXISTS %I', $1::text)",
                params: vec![extension.to_string()],
            },
        }
    }
}

/// A read-only existence check answered with a single boolean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    RoleExists { role: Identifier },
    DatabaseExists { database: Identifier },
    /// Is `member` a direct member of `role`?
    RoleMembership { role: Identifier, member: Identifier },
    SchemaOwnedBy { schema: Identifier, owner: Identifier },
    ExtensionInstalled { extension: ExtensionName },
}

impl Probe {
    /// Query text and bound parameters.
    #[must_use]
    pub fn render(&self) -> (&'static str, Vec<String>) {
        match self {
            Self::RoleExists { role } => (
                "SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)",
                vec![role.to_string()],
            ),
            Self::DatabaseExists { database } => (
                "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)",
                vec![database.to_string()],
            ),
            Self::RoleMembership { role, member } => (
                "SELECT EXISTS (SELECT 1 FROM pg_auth_members m \
                 JOIN pg_roles r ON r.oid = m.roleid \
                 JOIN pg_roles u ON u.oid = m.member \
                 WHERE r.rolname = $1 AND u.rolname = $2)",
                vec![role.to_string(), member.to_string()],
            ),
            Self::SchemaOwnedBy { schema, owner } => (
                "SELECT EXISTS (SELECT 1 FROM pg_namespace n \
                 JOIN pg_roles r ON r.oid = n.nspowner \
                 WHERE n.nspname = $1 AND r.rolname = $2)",
                vec![schema.to_string(), owner.to_string()],
            ),
            Self::ExtensionInstalled { extension } => (
                "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = $1)",
                vec![extension.to_string()],
            ),
        }
    }
}
