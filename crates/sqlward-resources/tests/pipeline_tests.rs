//! End-to-end pipeline tests over an in-memory backend handle.
//!
//! Each test drives a [`Reconciler`] through observe/create/update/delete
//! and asserts the exact statement text the backend received.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sqlward_backend::{
    sqlx, BackendError, BackendHandle, BackendResult, BackendRow, Dialect, ScanValue, Statement,
};
use sqlward_core::details;
use sqlward_resources::mysql::{Database, DatabaseSpec};
use sqlward_resources::postgres::{
    DefaultObjectType, DefaultPrivileges, DefaultPrivilegesSpec, Extension, ExtensionSpec, Grant,
    GrantSpec, Role, RolePrivileges, RoleSpec, RoleStatus, Schema, SchemaSpec,
};
use sqlward_resources::Reconciler;
use sqlward_secrets::{CredentialResolver, SecretData, SecretKeyRef, StaticSecretStore};

/// What observation queries against the mock return.
enum Observed {
    Empty,
    Row(BackendRow),
    Rows(Vec<BackendRow>),
    AbsentCatalog,
}

struct MockHandle {
    dialect: Dialect,
    observed: Observed,
    exec_fails_absent: bool,
    executed: Mutex<Vec<String>>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl MockHandle {
    fn new(dialect: Dialect, observed: Observed) -> Self {
        Self {
            dialect,
            observed,
            exec_fails_absent: false,
            executed: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

fn absent_catalog() -> BackendError {
    BackendError::DatabaseAbsent {
        source: sqlx::Error::RowNotFound,
    }
}

#[async_trait]
impl BackendHandle for MockHandle {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn fetch_optional(&self, _query: &Statement) -> BackendResult<Option<BackendRow>> {
        match &self.observed {
            Observed::Empty => Ok(None),
            Observed::Row(row) => Ok(Some(row.clone())),
            Observed::Rows(rows) => Ok(rows.first().cloned()),
            Observed::AbsentCatalog => Err(absent_catalog()),
        }
    }

    async fn fetch_all(&self, _query: &Statement) -> BackendResult<Vec<BackendRow>> {
        match &self.observed {
            Observed::Empty => Ok(Vec::new()),
            Observed::Row(row) => Ok(vec![row.clone()]),
            Observed::Rows(rows) => Ok(rows.clone()),
            Observed::AbsentCatalog => Err(absent_catalog()),
        }
    }

    async fn exec(&self, statement: &Statement) -> BackendResult<()> {
        if self.exec_fails_absent {
            return Err(absent_catalog());
        }
        self.executed.lock().unwrap().push(statement.sql.clone());
        Ok(())
    }

    async fn exec_tx(&self, statements: &[Statement]) -> BackendResult<()> {
        self.batches
            .lock()
            .unwrap()
            .push(statements.iter().map(|s| s.sql.clone()).collect());
        Ok(())
    }
}

fn resolver_with(pairs: &[(&str, &str, &str, &str)]) -> CredentialResolver {
    let store = StaticSecretStore::new();
    for (namespace, name, key, value) in pairs {
        let mut data = SecretData::new();
        data.insert((*key).to_string(), value.as_bytes().to_vec());
        store.put(*namespace, *name, data);
    }
    CredentialResolver::new(Arc::new(store))
}

fn role_row(
    flags: [bool; 7],
    connection_limit: i64,
) -> BackendRow {
    let mut values: Vec<ScanValue> = flags.iter().map(|b| ScanValue::Bool(*b)).collect();
    values.push(ScanValue::Int(connection_limit));
    BackendRow::from_values(values)
}

#[tokio::test]
async fn test_absent_role_is_created_with_secret_password() {
    let handle = MockHandle::new(Dialect::Postgres, Observed::Empty);
    let resolver = resolver_with(&[("prod", "app-user-password", "password", "pw-1")]);

    let mut seed = sqlward_core::ConnectionDetails::new();
    seed.insert(details::HOST.to_string(), "db.internal".to_string());
    seed.insert(details::PORT.to_string(), "5432".to_string());

    let reconciler = Reconciler::new(Role::with_resolver(resolver)).with_seed_details(seed);
    let mut spec = RoleSpec {
        privileges: RolePrivileges {
            login: Some(true),
            create_db: Some(false),
            ..RolePrivileges::default()
        },
        password_secret_ref: Some(SecretKeyRef::new("prod", "app-user-password", "password")),
        ..RoleSpec::default()
    };
    let mut status = RoleStatus::default();

    let outcome = reconciler
        .reconcile(&handle, "app_user", &mut spec, &mut status, false)
        .await
        .unwrap();

    assert!(outcome.exists);
    assert!(outcome.up_to_date);
    assert_eq!(
        handle.executed(),
        vec!["CREATE ROLE \"app_user\" PASSWORD 'pw-1' NOCREATEDB LOGIN".to_string()]
    );

    let published = outcome.connection_details.unwrap();
    assert_eq!(published.get(details::HOST).unwrap(), "db.internal");
    assert_eq!(published.get(details::USERNAME).unwrap(), "app_user");
    assert_eq!(published.get(details::PASSWORD).unwrap(), "pw-1");

    // The snapshot records what was applied, in synthesis order.
    assert_eq!(status.privileges_as_clauses, vec!["NOCREATEDB", "LOGIN"]);
}

#[tokio::test]
async fn test_drifted_role_is_altered_not_recreated() {
    // Live role cannot log in; desired state says it must.
    let observed_flags = [false, true, false, false, false, false, false];
    let handle = MockHandle::new(Dialect::Postgres, Observed::Row(role_row(observed_flags, -1)));

    let reconciler = Reconciler::new(Role::new());
    let mut spec = RoleSpec {
        privileges: RolePrivileges {
            login: Some(true),
            ..RolePrivileges::default()
        },
        ..RoleSpec::default()
    };
    // Snapshot from the previous cycle matches the live role.
    let mut status = RoleStatus {
        privileges_as_clauses: vec![
            "NOSUPERUSER".to_string(),
            "INHERIT".to_string(),
            "NOCREATEDB".to_string(),
            "NOCREATEROLE".to_string(),
            "NOLOGIN".to_string(),
            "NOREPLICATION".to_string(),
            "NOBYPASSRLS".to_string(),
        ],
        connection_limit: Some(-1),
        configuration_parameters: None,
    };

    let outcome = reconciler
        .reconcile(&handle, "app_user", &mut spec, &mut status, false)
        .await
        .unwrap();

    assert!(outcome.exists);
    assert!(outcome.up_to_date);
    // Every unset flag late-initialized from the live role.
    assert!(outcome.late_initialized);
    assert_eq!(spec.privileges.inherit, Some(true));
    assert_eq!(spec.connection_limit, Some(-1));

    // Only the drifted clause is re-issued; the unchanged limit emits
    // nothing.
    assert_eq!(handle.executed(), vec!["ALTER ROLE \"app_user\" LOGIN"]);
}

#[tokio::test]
async fn test_unchanged_connection_limit_emits_no_statement() {
    let observed_flags = [false, true, false, false, false, false, false];
    let handle = MockHandle::new(Dialect::Postgres, Observed::Row(role_row(observed_flags, 10)));

    let reconciler = Reconciler::new(Role::new());
    let mut spec = RoleSpec {
        privileges: RolePrivileges {
            login: Some(true),
            ..RolePrivileges::default()
        },
        connection_limit: Some(10),
        ..RoleSpec::default()
    };
    let mut status = RoleStatus {
        privileges_as_clauses: vec![
            "NOSUPERUSER".to_string(),
            "INHERIT".to_string(),
            "NOCREATEDB".to_string(),
            "NOCREATEROLE".to_string(),
            "NOLOGIN".to_string(),
            "NOREPLICATION".to_string(),
            "NOBYPASSRLS".to_string(),
        ],
        connection_limit: Some(10),
        configuration_parameters: None,
    };

    reconciler
        .reconcile(&handle, "app_user", &mut spec, &mut status, false)
        .await
        .unwrap();

    let executed = handle.executed();
    assert_eq!(executed, vec!["ALTER ROLE \"app_user\" LOGIN"]);
    assert!(executed.iter().all(|sql| !sql.contains("CONNECTION LIMIT")));
}

#[tokio::test]
async fn test_changed_connection_limit_is_reissued_once() {
    let observed_flags = [false, true, false, false, true, false, false];
    let handle = MockHandle::new(Dialect::Postgres, Observed::Row(role_row(observed_flags, 5)));

    let reconciler = Reconciler::new(Role::new());
    let mut spec = RoleSpec {
        privileges: RolePrivileges {
            super_user: Some(false),
            inherit: Some(true),
            create_db: Some(false),
            create_role: Some(false),
            login: Some(true),
            replication: Some(false),
            bypass_rls: Some(false),
        },
        connection_limit: Some(20),
        ..RoleSpec::default()
    };
    let mut status = RoleStatus {
        privileges_as_clauses: vec![
            "NOSUPERUSER".to_string(),
            "INHERIT".to_string(),
            "NOCREATEDB".to_string(),
            "NOCREATEROLE".to_string(),
            "LOGIN".to_string(),
            "NOREPLICATION".to_string(),
            "NOBYPASSRLS".to_string(),
        ],
        connection_limit: Some(5),
        configuration_parameters: None,
    };

    reconciler
        .reconcile(&handle, "app_user", &mut spec, &mut status, false)
        .await
        .unwrap();

    assert_eq!(
        handle.executed(),
        vec!["ALTER ROLE \"app_user\" CONNECTION LIMIT 20"]
    );
    assert_eq!(status.connection_limit, Some(20));
}

#[tokio::test]
async fn test_pending_rotation_forces_update() {
    // Live role matches desired flags exactly.
    let observed_flags = [false, true, false, false, true, false, false];
    let handle = MockHandle::new(Dialect::Postgres, Observed::Row(role_row(observed_flags, -1)));

    let resolver = resolver_with(&[
        ("prod", "app-user-password", "password", "rotated-pw"),
        ("prod", "app-user-connection", "password", "old-pw"),
    ]);
    let reconciler = Reconciler::new(Role::with_resolver(resolver));

    let clauses = vec![
        "NOSUPERUSER".to_string(),
        "INHERIT".to_string(),
        "NOCREATEDB".to_string(),
        "NOCREATEROLE".to_string(),
        "LOGIN".to_string(),
        "NOREPLICATION".to_string(),
        "NOBYPASSRLS".to_string(),
    ];
    let mut spec = RoleSpec {
        privileges: RolePrivileges {
            super_user: Some(false),
            inherit: Some(true),
            create_db: Some(false),
            create_role: Some(false),
            login: Some(true),
            replication: Some(false),
            bypass_rls: Some(false),
        },
        connection_limit: Some(-1),
        password_secret_ref: Some(SecretKeyRef::new("prod", "app-user-password", "password")),
        published_secret_ref: Some(SecretKeyRef::new("prod", "app-user-connection", "password")),
        ..RoleSpec::default()
    };
    let mut status = RoleStatus {
        privileges_as_clauses: clauses,
        connection_limit: Some(-1),
        configuration_parameters: None,
    };

    let outcome = reconciler
        .reconcile(&handle, "app_user", &mut spec, &mut status, false)
        .await
        .unwrap();

    assert!(outcome.up_to_date);
    let executed = handle.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].starts_with("ALTER ROLE \"app_user\" PASSWORD "));

    // The new password is published for the connection secret.
    let published = outcome.connection_details.unwrap();
    assert_eq!(published.get(details::PASSWORD).unwrap(), "rotated-pw");
}

#[tokio::test]
async fn test_secret_ref_without_resolver_is_rejected() {
    // Live role matches desired flags; only the referenced password could
    // differ, and without a resolver that difference cannot be checked.
    let observed_flags = [false, true, false, false, true, false, false];
    let handle = MockHandle::new(Dialect::Postgres, Observed::Row(role_row(observed_flags, -1)));

    let reconciler = Reconciler::new(Role::new());
    let mut spec = RoleSpec {
        privileges: RolePrivileges {
            super_user: Some(false),
            inherit: Some(true),
            create_db: Some(false),
            create_role: Some(false),
            login: Some(true),
            replication: Some(false),
            bypass_rls: Some(false),
        },
        connection_limit: Some(-1),
        password_secret_ref: Some(SecretKeyRef::new("prod", "app-user-password", "password")),
        published_secret_ref: Some(SecretKeyRef::new("prod", "app-user-connection", "password")),
        ..RoleSpec::default()
    };
    let mut status = RoleStatus::default();

    let err = reconciler
        .reconcile(&handle, "app_user", &mut spec, &mut status, false)
        .await
        .unwrap_err();

    assert!(matches!(err, sqlward_resources::Error::InvalidSpec { .. }));
    assert!(handle.executed().is_empty());
}

#[tokio::test]
async fn test_schema_in_dropped_catalog_reads_as_absent_and_recreates() {
    // Parent database was dropped; the observation query errors with the
    // catalog-absent driver condition.
    let handle = MockHandle::new(Dialect::Postgres, Observed::AbsentCatalog);

    let reconciler = Reconciler::new(Schema::new());
    let mut spec = SchemaSpec {
        role: Some("app_owner".to_string()),
        revoke_public_on_schema: true,
    };

    let outcome = reconciler
        .reconcile(&handle, "reporting", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.exists);
    assert_eq!(
        handle.batches(),
        vec![vec![
            "CREATE SCHEMA IF NOT EXISTS \"reporting\" AUTHORIZATION \"app_owner\";".to_string(),
            "REVOKE ALL ON SCHEMA PUBLIC FROM PUBLIC;".to_string(),
        ]]
    );
}

#[tokio::test]
async fn test_delete_tolerates_absent_catalog() {
    let mut handle = MockHandle::new(Dialect::Postgres, Observed::Empty);
    handle.exec_fails_absent = true;

    let reconciler = Reconciler::new(Schema::new());
    let mut spec = SchemaSpec::default();

    let outcome = reconciler
        .reconcile(&handle, "reporting", &mut spec, &mut (), true)
        .await
        .unwrap();

    assert!(!outcome.exists);
    assert!(handle.executed().is_empty());
}

#[tokio::test]
async fn test_matching_extension_executes_nothing() {
    let row = BackendRow::from_values(vec![ScanValue::Text("1.2".to_string())]);
    let handle = MockHandle::new(Dialect::Postgres, Observed::Row(row));

    let reconciler = Reconciler::new(Extension::new());
    let mut spec = ExtensionSpec { version: None };

    let outcome = reconciler
        .reconcile(&handle, "pgcrypto", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.exists);
    assert!(outcome.up_to_date);
    assert!(outcome.late_initialized);
    assert_eq!(spec.version.as_deref(), Some("1.2"));
    assert!(handle.executed().is_empty());
    assert!(handle.batches().is_empty());
}

#[tokio::test]
async fn test_absent_mysql_database_is_created_and_published() {
    let handle = MockHandle::new(Dialect::MySql, Observed::Empty);

    let mut seed = sqlward_core::ConnectionDetails::new();
    seed.insert(details::HOST.to_string(), "mysql.internal".to_string());
    seed.insert(details::PORT.to_string(), "3306".to_string());

    let reconciler = Reconciler::new(Database::new()).with_seed_details(seed);
    let mut spec = DatabaseSpec {
        character_set: Some("utf8mb4".to_string()),
        collation: None,
    };

    let outcome = reconciler
        .reconcile(&handle, "appdb", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert_eq!(
        handle.executed(),
        vec!["CREATE DATABASE `appdb` CHARACTER SET utf8mb4".to_string()]
    );

    let published = outcome.connection_details.unwrap();
    assert_eq!(published.get(details::HOST).unwrap(), "mysql.internal");
    assert_eq!(published.get(details::DATABASE).unwrap(), "appdb");
}

fn privilege_row(privilege: &str, grantable: bool) -> BackendRow {
    BackendRow::from_values(vec![
        ScanValue::Text(privilege.to_string()),
        ScanValue::Bool(grantable),
    ])
}

fn database_grant_spec() -> GrantSpec {
    GrantSpec {
        role: "app_reader".to_string(),
        database: Some("appdb".to_string()),
        privileges: vec!["CONNECT".to_string(), "TEMPORARY".to_string()],
        member_of: None,
        with_option: false,
    }
}

#[tokio::test]
async fn test_database_grant_with_superset_of_privileges_is_up_to_date() {
    // The role holds more than desired; desired is a subset, so nothing
    // runs. Excess privileges are only stripped by an update's re-issue.
    let handle = MockHandle::new(
        Dialect::Postgres,
        Observed::Rows(vec![
            privilege_row("CONNECT", false),
            privilege_row("TEMPORARY", false),
            privilege_row("CREATE", false),
        ]),
    );

    let reconciler = Reconciler::new(Grant::new());
    let mut spec = database_grant_spec();

    let outcome = reconciler
        .reconcile(&handle, "app_reader-appdb", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.exists);
    assert!(outcome.up_to_date);
    assert!(handle.executed().is_empty());
    assert!(handle.batches().is_empty());
}

#[tokio::test]
async fn test_database_grant_missing_grantability_reissues_atomically() {
    // WITH GRANT OPTION is desired but one held privilege is not grantable.
    let handle = MockHandle::new(
        Dialect::Postgres,
        Observed::Rows(vec![
            privilege_row("CONNECT", true),
            privilege_row("TEMPORARY", false),
        ]),
    );

    let reconciler = Reconciler::new(Grant::new());
    let mut spec = database_grant_spec();
    spec.with_option = true;

    let outcome = reconciler
        .reconcile(&handle, "app_reader-appdb", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.up_to_date);
    // Revoke-then-grant in one transaction, never a bare revoke.
    assert!(handle.executed().is_empty());
    assert_eq!(
        handle.batches(),
        vec![vec![
            "REVOKE ALL ON DATABASE \"appdb\" FROM \"app_reader\"".to_string(),
            "GRANT CONNECT, TEMPORARY ON DATABASE \"appdb\" TO \"app_reader\" \
             WITH GRANT OPTION"
                .to_string(),
        ]]
    );
}

#[tokio::test]
async fn test_membership_grant_missing_admin_option_reissues() {
    // Membership row exists but without the admin option.
    let handle = MockHandle::new(
        Dialect::Postgres,
        Observed::Row(BackendRow::from_values(vec![ScanValue::Bool(false)])),
    );

    let reconciler = Reconciler::new(Grant::new());
    let mut spec = GrantSpec {
        role: "app_reader".to_string(),
        database: None,
        privileges: Vec::new(),
        member_of: Some("readers".to_string()),
        with_option: true,
    };

    let outcome = reconciler
        .reconcile(&handle, "app_reader-readers", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.up_to_date);
    assert_eq!(
        handle.batches(),
        vec![vec![
            "REVOKE \"readers\" FROM \"app_reader\"".to_string(),
            "GRANT \"readers\" TO \"app_reader\" WITH ADMIN OPTION".to_string(),
        ]]
    );
}

#[tokio::test]
async fn test_grant_with_no_rows_is_created_with_single_statement() {
    let handle = MockHandle::new(Dialect::Postgres, Observed::Empty);

    let reconciler = Reconciler::new(Grant::new());
    let mut spec = database_grant_spec();

    let outcome = reconciler
        .reconcile(&handle, "app_reader-appdb", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.exists);
    // Nothing to revoke on first grant.
    assert_eq!(
        handle.executed(),
        vec!["GRANT CONNECT, TEMPORARY ON DATABASE \"appdb\" TO \"app_reader\"".to_string()]
    );
    assert!(handle.batches().is_empty());
}

fn default_privileges_spec() -> DefaultPrivilegesSpec {
    DefaultPrivilegesSpec {
        target_role: Some("app_owner".to_string()),
        schema: "reporting".to_string(),
        object_type: DefaultObjectType::Table,
        privileges: vec!["SELECT".to_string(), "INSERT".to_string()],
        role: "app_reader".to_string(),
        with_grant_option: false,
    }
}

#[tokio::test]
async fn test_default_privileges_missing_privilege_reissues_in_full() {
    // Only SELECT is present in the rule; the whole GRANT is re-issued,
    // not an incremental diff.
    let handle = MockHandle::new(
        Dialect::Postgres,
        Observed::Rows(vec![BackendRow::from_values(vec![ScanValue::Text(
            "SELECT".to_string(),
        )])]),
    );

    let reconciler = Reconciler::new(DefaultPrivileges::new());
    let mut spec = default_privileges_spec();

    let outcome = reconciler
        .reconcile(&handle, "reporting-tables", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.up_to_date);
    assert_eq!(
        handle.executed(),
        vec![
            "ALTER DEFAULT PRIVILEGES FOR ROLE \"app_owner\" IN SCHEMA \"reporting\" \
             GRANT SELECT, INSERT ON TABLES TO \"app_reader\""
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_default_privileges_superset_is_up_to_date() {
    let handle = MockHandle::new(
        Dialect::Postgres,
        Observed::Rows(vec![
            BackendRow::from_values(vec![ScanValue::Text("SELECT".to_string())]),
            BackendRow::from_values(vec![ScanValue::Text("INSERT".to_string())]),
            BackendRow::from_values(vec![ScanValue::Text("UPDATE".to_string())]),
        ]),
    );

    let reconciler = Reconciler::new(DefaultPrivileges::new());
    let mut spec = default_privileges_spec();

    let outcome = reconciler
        .reconcile(&handle, "reporting-tables", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.exists);
    assert!(outcome.up_to_date);
    assert!(handle.executed().is_empty());
}

#[tokio::test]
async fn test_matching_mysql_database_executes_nothing() {
    let row = BackendRow::from_values(vec![
        ScanValue::Text("utf8mb4".to_string()),
        ScanValue::Text("utf8mb4_unicode_ci".to_string()),
    ]);
    let handle = MockHandle::new(Dialect::MySql, Observed::Row(row));

    let reconciler = Reconciler::new(Database::new());
    let mut spec = DatabaseSpec::default();

    let outcome = reconciler
        .reconcile(&handle, "appdb", &mut spec, &mut (), false)
        .await
        .unwrap();

    assert!(outcome.up_to_date);
    // Both fields late-initialized from the live database.
    assert_eq!(spec.character_set.as_deref(), Some("utf8mb4"));
    assert_eq!(spec.collation.as_deref(), Some("utf8mb4_unicode_ci"));
    assert!(handle.executed().is_empty());
}
