//! Database provisioning state machine.
//!
//! Drives one [`PostgresDatabase`] toward its declared role, database,
//! schemas and extensions, and tears it down behind a finalizer.
//!
//! Live state is never stored. Each pass classifies the server as
//!
//! - [`LiveState::Ready`]: the subject credentials connect
//! - [`LiveState::CredentialDrift`]: the database exists but the subject
//!   credentials are rejected
//! - [`LiveState::Absent`]: no database of that name
//!
//! and then walks the same idempotent steps. Every mutation is preceded by an
//! existence probe, so a pass over converged state issues no statement and a
//! pass interrupted anywhere resumes cleanly.

use std::sync::Arc;

use siteop_core::{DynClusterClient, ManagedObject, ObjectKey, add_finalizer, remove_finalizer};
use siteop_db_postgres::connection::{
    database_name, ensure_same_server, mask_password, password, role_name, with_database,
    with_password,
};
use siteop_db_postgres::{
    DynDatabaseClient, ExtensionName, Identifier, Password, PostgresError, Probe, Statement,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::crd::{PostgresDatabase, PostgresDatabaseSpec};
use crate::error::{ReconcileError, Result};
use crate::secrets::SecretResolver;

/// Finalizer guarding external cleanup of a provisioned database.
pub const DATABASE_FINALIZER: &str = "siteop.io/database-teardown";

/// Schema every new database starts with.
const PUBLIC_SCHEMA: &str = "public";

/// Key of the administrative password in `mainDatabaseCredentialSecret`.
const MAIN_PASSWORD_KEY: &str = "password";

/// Server state observed at the start of a converge pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    Ready,
    CredentialDrift,
    Absent,
}

/// What one provisioner pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Converge pass finished; the subject credentials connect.
    Converged {
        state: LiveState,
        /// Mutating statements issued during the pass.
        mutations: usize,
    },
    /// Teardown finished and the finalizer is gone.
    TornDown { dropped: bool },
}

/// Names and URLs derived from a declared spec, all validated.
#[derive(Debug, Clone)]
struct Plan {
    role: Identifier,
    database: Identifier,
    schemas: Vec<Identifier>,
    extensions: Vec<ExtensionName>,
    /// Declared URL, before password resolution.
    declared: Url,
}

impl Plan {
    fn from_spec(spec: &PostgresDatabaseSpec) -> Result<Self> {
        let declared = siteop_db_postgres::connection::parse_url(&spec.url)?;
        let role = role_name(&declared)?;
        let database = database_name(&declared)?;
        let schemas = spec
            .schemas
            .iter()
            .map(|name| Identifier::parse(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let extensions = spec
            .extensions
            .iter()
            .map(|name| ExtensionName::parse(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            role,
            database,
            schemas,
            extensions,
            declared,
        })
    }
}

/// The two connection identities of a pass.
struct Connections {
    /// Administrative credentials on the maintenance database.
    admin: Url,
    /// Administrative credentials on the subject database.
    admin_on_subject: Url,
    /// Subject credentials on the subject database.
    subject: Url,
    admin_role: Identifier,
}

/// Converges [`PostgresDatabase`] objects against one administrative server.
pub struct DatabaseProvisioner {
    cluster: DynClusterClient,
    database: DynDatabaseClient,
    secrets: Arc<dyn SecretResolver>,
    main_url: Url,
    grant_subject_to_admin: bool,
}

impl DatabaseProvisioner {
    pub fn new(
        cluster: DynClusterClient,
        database: DynDatabaseClient,
        secrets: Arc<dyn SecretResolver>,
        main_url: Url,
    ) -> Self {
        Self {
            cluster,
            database,
            secrets,
            main_url,
            grant_subject_to_admin: true,
        }
    }

    /// Whether each subject role is granted to the administrative role.
    #[must_use]
    pub fn with_grant_subject_to_admin(mut self, grant: bool) -> Self {
        self.grant_subject_to_admin = grant;
        self
    }

    /// Runs one pass for the declared object: teardown when it is being
    /// deleted, converge otherwise.
    ///
    /// # Errors
    ///
    /// Any failure aborts the pass. Nothing is retried here.
    #[instrument(skip_all, fields(namespace = %object.namespace(), name = %object.name()))]
    pub async fn provision(&self, object: &ManagedObject) -> Result<ProvisionOutcome> {
        let declared: PostgresDatabase = object.to_resource()?;
        let key = ObjectKey::of::<PostgresDatabase>(object.namespace(), object.name());

        if object.is_deleting() {
            self.teardown(&key, object, &declared.spec).await
        } else {
            self.converge(&key, object, &declared.spec).await
        }
    }

    async fn converge(
        &self,
        key: &ObjectKey,
        object: &ManagedObject,
        spec: &PostgresDatabaseSpec,
    ) -> Result<ProvisionOutcome> {
        // Validation touches nothing, so a bad name never gets a finalizer.
        let plan = Plan::from_spec(spec)?;
        ensure_same_server(&self.main_url, &plan.declared)?;

        add_finalizer(self.cluster.as_ref(), key, object, DATABASE_FINALIZER).await?;

        let conns = self.connections(key, spec, &plan).await?;
        let state = self.probe_state(&plan, &conns).await?;
        info!(
            database = %plan.database,
            role = %plan.role,
            ?state,
            "Observed database state"
        );

        let subject_password = password(&conns.subject)?
            .ok_or_else(|| ReconcileError::config("subject URL lost its password"))?;
        let mut mutations = 0;

        match state {
            LiveState::Ready => {}
            LiveState::CredentialDrift => {
                mutations += self
                    .ensure_role(&conns, &plan.role, &subject_password)
                    .await?;
            }
            LiveState::Absent => {
                mutations += self
                    .ensure_role(&conns, &plan.role, &subject_password)
                    .await?;
                // The owner must be grantable before CREATE DATABASE ... OWNER.
                mutations += self.ensure_membership(&conns, &plan.role).await?;
                mutations += self.ensure_database(&conns, &plan).await?;
            }
        }

        mutations += self.ensure_membership(&conns, &plan.role).await?;
        mutations += self.ensure_public_owner(&conns, &plan.role).await?;
        for schema in &plan.schemas {
            mutations += self.ensure_schema(&conns, schema, &plan.role).await?;
        }
        for extension in &plan.extensions {
            mutations += self.ensure_extension(&conns, extension).await?;
        }

        self.database
            .ping(&conns.subject)
            .await
            .map_err(|source| ReconcileError::Verification {
                database: plan.database.to_string(),
                source,
            })?;

        info!(database = %plan.database, mutations, "Database converged");
        Ok(ProvisionOutcome::Converged { state, mutations })
    }

    async fn teardown(
        &self,
        key: &ObjectKey,
        object: &ManagedObject,
        spec: &PostgresDatabaseSpec,
    ) -> Result<ProvisionOutcome> {
        if !object.has_finalizer(DATABASE_FINALIZER) {
            debug!("Finalizer already removed");
            return Ok(ProvisionOutcome::TornDown { dropped: false });
        }

        let dropped = spec.teardown.drop;
        if dropped {
            let declared = siteop_db_postgres::connection::parse_url(&spec.url)?;
            let role = role_name(&declared)?;
            let database = database_name(&declared)?;
            let admin = self.admin_url(key, spec).await?;
            ensure_same_server(&admin, &declared)?;

            let database_probe = Probe::DatabaseExists {
                database: database.clone(),
            };
            if self.database.probe(&admin, &database_probe).await? {
                self.exec(&admin, Statement::DropDatabase {
                    database: database.clone(),
                })
                .await?;
            } else {
                debug!(database = %database, "Database already absent");
            }

            let role_probe = Probe::RoleExists { role: role.clone() };
            if self.database.probe(&admin, &role_probe).await? {
                self.exec(&admin, Statement::DropRole { role: role.clone() })
                    .await?;
            } else {
                debug!(role = %role, "Role already absent");
            }
        } else {
            info!("Teardown policy keeps the database");
        }

        remove_finalizer(self.cluster.as_ref(), key, object, DATABASE_FINALIZER).await?;
        info!(dropped, "Database torn down");
        Ok(ProvisionOutcome::TornDown { dropped })
    }

    /// Administrative URL, with its password replaced from
    /// `mainDatabaseCredentialSecret` when one is declared.
    async fn admin_url(&self, key: &ObjectKey, spec: &PostgresDatabaseSpec) -> Result<Url> {
        let Some(secret) = spec.main_database_credential_secret.as_ref() else {
            return Ok(self.main_url.clone());
        };
        let password = self
            .secrets
            .resolve(&key.namespace, &secret.name, MAIN_PASSWORD_KEY)
            .await?;
        Ok(with_password(&self.main_url, &password)?)
    }

    /// Resolves both credential tiers.
    async fn connections(
        &self,
        key: &ObjectKey,
        spec: &PostgresDatabaseSpec,
        plan: &Plan,
    ) -> Result<Connections> {
        let admin = self.admin_url(key, spec).await?;
        if password(&admin)?.is_none() {
            return Err(ReconcileError::config(
                "administrative database URL has no password",
            ));
        }

        let subject_password = match spec.password_secret() {
            Some(secret) => {
                self.secrets
                    .resolve(&key.namespace, &secret.name, spec.password_key())
                    .await?
            }
            None => password(&plan.declared)?.ok_or_else(|| {
                ReconcileError::config(format!(
                    "no password for role {}: set a secret or put one in the URL",
                    plan.role
                ))
            })?,
        };

        Ok(Connections {
            admin_on_subject: with_database(&admin, &plan.database),
            subject: with_password(&plan.declared, &subject_password)?,
            admin_role: role_name(&admin)?,
            admin,
        })
    }

    async fn probe_state(&self, plan: &Plan, conns: &Connections) -> Result<LiveState> {
        match self.database.ping(&conns.subject).await {
            Ok(()) => return Ok(LiveState::Ready),
            Err(err) => debug!(error = %err, "Subject connection failed"),
        }
        match self.database.ping(&conns.admin_on_subject).await {
            Ok(()) => Ok(LiveState::CredentialDrift),
            Err(err) if err.is_authentication_failure() => {
                debug!(database = %plan.database, error = %err, "Database not reachable");
                Ok(LiveState::Absent)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Creates the login role, or aligns its password if it exists.
    async fn ensure_role(
        &self,
        conns: &Connections,
        role: &Identifier,
        subject_password: &Password,
    ) -> Result<usize> {
        let exists = self
            .database
            .probe(&conns.admin, &Probe::RoleExists { role: role.clone() })
            .await?;
        let statement = if exists {
            Statement::AlterRolePassword {
                role: role.clone(),
                password: subject_password.clone(),
            }
        } else {
            Statement::CreateRole {
                role: role.clone(),
                password: subject_password.clone(),
            }
        };
        self.exec(&conns.admin, statement).await?;
        Ok(1)
    }

    async fn ensure_database(&self, conns: &Connections, plan: &Plan) -> Result<usize> {
        let probe = Probe::DatabaseExists {
            database: plan.database.clone(),
        };
        if self.database.probe(&conns.admin, &probe).await? {
            return Ok(0);
        }
        self.exec(&conns.admin, Statement::CreateDatabase {
            database: plan.database.clone(),
            owner: plan.role.clone(),
        })
        .await?;
        Ok(1)
    }

    /// Lets the administrative role act as the subject role.
    async fn ensure_membership(&self, conns: &Connections, role: &Identifier) -> Result<usize> {
        if !self.grant_subject_to_admin || conns.admin_role == *role {
            return Ok(0);
        }
        let probe = Probe::RoleMembership {
            role: role.clone(),
            member: conns.admin_role.clone(),
        };
        if self.database.probe(&conns.admin, &probe).await? {
            return Ok(0);
        }
        self.exec(&conns.admin, Statement::GrantRole {
            role: role.clone(),
            member: conns.admin_role.clone(),
        })
        .await?;
        Ok(1)
    }

    async fn ensure_public_owner(&self, conns: &Connections, role: &Identifier) -> Result<usize> {
        let schema = Identifier::parse(PUBLIC_SCHEMA)?;
        if self.schema_owned(conns, &schema, role).await? {
            return Ok(0);
        }
        self.exec(&conns.admin_on_subject, Statement::AlterSchemaOwner {
            schema,
            owner: role.clone(),
        })
        .await?;
        Ok(1)
    }

    /// Hands an existing schema to the role, or creates it as the role.
    async fn ensure_schema(
        &self,
        conns: &Connections,
        schema: &Identifier,
        role: &Identifier,
    ) -> Result<usize> {
        if self.schema_owned(conns, schema, role).await? {
            return Ok(0);
        }
        let alter = Statement::AlterSchemaOwner {
            schema: schema.clone(),
            owner: role.clone(),
        };
        match self.exec(&conns.admin_on_subject, alter).await {
            Ok(()) => Ok(1),
            Err(ReconcileError::Database(err)) if err.is_invalid_schema_name() => {
                debug!(schema = %schema, "Schema missing, creating as subject role");
                self.exec(&conns.subject, Statement::CreateSchema {
                    schema: schema.clone(),
                    owner: role.clone(),
                })
                .await?;
                Ok(1)
            }
            Err(err) => Err(err),
        }
    }

    async fn schema_owned(
        &self,
        conns: &Connections,
        schema: &Identifier,
        role: &Identifier,
    ) -> Result<bool> {
        let probe = Probe::SchemaOwnedBy {
            schema: schema.clone(),
            owner: role.clone(),
        };
        Ok(self.database.probe(&conns.admin_on_subject, &probe).await?)
    }

    async fn ensure_extension(&self, conns: &Connections, extension: &ExtensionName) -> Result<usize> {
        let probe = Probe::ExtensionInstalled {
            extension: extension.clone(),
        };
        if self.database.probe(&conns.admin_on_subject, &probe).await? {
            return Ok(0);
        }
        self.exec(&conns.admin_on_subject, Statement::CreateExtension {
            extension: extension.clone(),
        })
        .await?;
        Ok(1)
    }

    async fn exec(&self, url: &Url, statement: Statement) -> Result<()> {
        let operation = statement.operation();
        self.database
            .exec(url, &statement)
            .await
            .inspect(|_| info!(operation, "Executed statement"))
            .map_err(|err: PostgresError| {
                warn!(
                    operation,
                    url = %mask_password(url),
                    error = %err,
                    "Statement failed"
                );
                ReconcileError::from(err)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(url: &str) -> PostgresDatabaseSpec {
        PostgresDatabaseSpec {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_extracts_names() {
        let mut declared = spec("postgres://svc@db-host/svc_db");
        declared.schemas = vec!["app".into(), "metrics".into()];
        declared.extensions = vec!["pg_trgm".into()];

        let plan = Plan::from_spec(&declared).unwrap();
        assert_eq!(plan.role.as_str(), "svc");
        assert_eq!(plan.database.as_str(), "svc_db");
        assert_eq!(plan.schemas.len(), 2);
        assert_eq!(plan.extensions[0].as_str(), "pg_trgm");
    }

    #[test]
    fn test_plan_rejects_unsafe_names() {
        for url in [
            "postgres://0lol@db-host/svc",
            "postgres://svc@db-host/a-zz",
            "postgres://svc@db-host/select",
            "mysql://svc@db-host/svc",
        ] {
            assert!(Plan::from_spec(&spec(url)).is_err(), "{url} accepted");
        }

        let mut declared = spec("postgres://svc@db-host/svc");
        declared.schemas = vec!["x".repeat(67)];
        let err = Plan::from_spec(&declared).unwrap_err();
        assert!(err.is_configuration());
    }
}
