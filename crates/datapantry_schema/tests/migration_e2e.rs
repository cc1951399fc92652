use async_trait::async_trait;
use datapantry_db::{DbError, PantryDb, PhysicalColumnDef};
use datapantry_schema::{
    Column, Constraint, DataType, DiffOp, LayoutRefs, MigrationError, MigrationRequest, Migrator,
    NullReason, RebuildState, Row, RowStore, StoreResult, SubtypeStore, SubtypeTag, Value,
};

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().cloned().collect()
}

fn values(rows: &[Row], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|r| r.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

async fn insert(db: &PantryDb, table: &str, rows: &[Row]) {
    let columns = RowStore::list_columns(db, table).await.unwrap();
    RowStore::bulk_insert(db, table, &columns, rows).await.unwrap();
}

async fn read(db: &PantryDb, table: &str) -> Vec<Row> {
    let columns = RowStore::list_columns(db, table).await.unwrap();
    RowStore::list_rows(db, table, &columns).await.unwrap()
}

/// `people(id, name)` with three rows, two of them named Lucy.
async fn people_with_names() -> (Migrator<PantryDb>, PantryDb) {
    let db = PantryDb::open_memory().await.unwrap();
    let migrator = Migrator::new(db.clone());
    migrator.create_table("people").await.unwrap();

    let columns = vec![Column::default_id(), Column::new("name", DataType::String)];
    let ops = vec![DiffOp::Add {
        name: "name".into(),
        datatype: DataType::String,
        is_required: false,
    }];
    migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap();

    insert(
        &db,
        "people",
        &[
            row(&[("id", Value::from(1)), ("name", Value::from("Lucy"))]),
            row(&[("id", Value::from(2)), ("name", Value::from("Lucy"))]),
            row(&[("id", Value::from(3)), ("name", Value::from("Max"))]),
        ],
    )
    .await;
    (migrator, db)
}

/// `teams(id)` holding ids 1 and 2, plus an empty `people(id, team -> teams.id)`.
async fn teams_and_people(migrator: &Migrator<PantryDb>, db: &PantryDb) {
    migrator.create_table("teams").await.unwrap();
    insert(
        db,
        "teams",
        &[row(&[("id", Value::from(1))]), row(&[("id", Value::from(2))])],
    )
    .await;

    migrator.create_table("people").await.unwrap();
    let columns = vec![Column::default_id(), Column::reference("team", "teams", "id")];
    let ops = vec![DiffOp::Add {
        name: "team".into(),
        datatype: DataType::ForeignKey,
        is_required: false,
    }];
    migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap();
}

#[tokio::test]
async fn making_a_string_column_unique_suffixes_duplicates() {
    let (migrator, db) = people_with_names().await;

    let columns = vec![
        Column::default_id(),
        Column::new("name", DataType::String).unique(),
    ];
    let ops = vec![DiffOp::ConstraintChange {
        name: "name".into(),
        constraint: Constraint::Unique,
    }];
    let outcome = migrator
        .migrate_table("people", columns.clone(), ops, true)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.rows_copied, 3);
    assert!(!outcome.referential_integrity_degraded);

    let rows = read(&db, "people").await;
    assert_eq!(
        values(&rows, "name"),
        vec![
            Value::from("Lucy_1"),
            Value::from("Lucy_2"),
            Value::from("Max")
        ]
    );
    assert_eq!(RowStore::list_columns(&db, "people").await.unwrap(), columns);
}

#[tokio::test]
async fn deleting_and_adding_columns_rewrites_every_row() {
    let (migrator, db) = people_with_names().await;

    let columns = vec![Column::default_id(), Column::new("age", DataType::Number)];
    let ops = vec![
        DiffOp::Add {
            name: "age".into(),
            datatype: DataType::Number,
            is_required: false,
        },
        DiffOp::Delete {
            name: "name".into(),
        },
    ];
    migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap();

    let rows = read(&db, "people").await;
    assert_eq!(rows.len(), 3);
    for r in &rows {
        assert!(!r.contains_key("name"));
        assert_eq!(r.get("age"), Some(&Value::Number(0.0)));
    }
}

#[tokio::test]
async fn retyping_to_boolean_records_the_subtype() {
    let (migrator, db) = people_with_names().await;

    let columns = vec![Column::default_id(), Column::new("name", DataType::Boolean)];
    let ops = vec![DiffOp::Retype {
        name: "name".into(),
        from: DataType::String,
        to: DataType::Boolean,
    }];
    migrator
        .migrate_table("people", columns.clone(), ops, true)
        .await
        .unwrap();

    assert_eq!(
        db.get_subtype("people", "name").await.unwrap(),
        Some(SubtypeTag::Boolean)
    );
    assert_eq!(RowStore::list_columns(&db, "people").await.unwrap(), columns);
    assert_eq!(
        values(&read(&db, "people").await, "name"),
        vec![Value::Bool(false); 3]
    );
}

#[tokio::test]
async fn renaming_a_table_moves_metadata_and_layout() {
    let (migrator, db) = people_with_names().await;
    db.upsert_position("people", 40, 80).await.unwrap();

    let columns = vec![
        Column::default_id(),
        Column::new("name", DataType::String),
        Column::new("joined", DataType::Date),
    ];
    let ops = vec![DiffOp::Add {
        name: "joined".into(),
        datatype: DataType::Date,
        is_required: false,
    }];
    let request = MigrationRequest::new("people", columns, ops, true).rename_to("staff");
    let outcome = migrator.migrate(request).await.unwrap();

    assert_eq!(outcome.table, "staff");
    assert_eq!(migrator.list_tables().await.unwrap(), vec!["staff".to_string()]);
    assert_eq!(read(&db, "staff").await.len(), 3);

    assert_eq!(
        db.get_subtype("staff", "joined").await.unwrap(),
        Some(SubtypeTag::Date)
    );
    assert_eq!(db.get_subtype("people", "joined").await.unwrap(), None);

    let position = db.position("staff").await.unwrap().unwrap();
    assert_eq!((position.x, position.y), (40, 80));
    assert!(db.position("people").await.unwrap().is_none());
}

#[tokio::test]
async fn discarding_data_leaves_an_empty_table() {
    let (migrator, db) = people_with_names().await;

    let columns = vec![Column::default_id(), Column::new("name", DataType::String)];
    let outcome = migrator
        .migrate_table("people", columns, vec![], false)
        .await
        .unwrap();

    assert_eq!(outcome.rows_copied, 0);
    assert!(read(&db, "people").await.is_empty());
}

#[tokio::test]
async fn dangling_references_are_nulled_and_reported() {
    let db = PantryDb::open_memory().await.unwrap();
    let migrator = Migrator::new(db.clone());
    teams_and_people(&migrator, &db).await;
    insert(
        &db,
        "people",
        &[
            row(&[("id", Value::from(1)), ("team", Value::from(1))]),
            row(&[("id", Value::from(2)), ("team", Value::from(3))]),
        ],
    )
    .await;

    let columns = vec![
        Column::default_id(),
        Column::reference("team", "teams", "id"),
        Column::new("note", DataType::String),
    ];
    let ops = vec![DiffOp::Add {
        name: "note".into(),
        datatype: DataType::String,
        is_required: false,
    }];
    let outcome = migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap();

    assert!(outcome.referential_integrity_degraded);
    let nulled = &outcome.report.nulled_references;
    assert_eq!(nulled.len(), 1);
    assert_eq!(nulled[0].column, "team");
    assert_eq!(nulled[0].reason, NullReason::DanglingReference);
    assert_eq!(nulled[0].count, 1);

    let rows = read(&db, "people").await;
    assert_eq!(values(&rows, "team"), vec![Value::Number(1.0), Value::Null]);
}

#[tokio::test]
async fn self_references_resolve_against_migrated_rows() {
    let db = PantryDb::open_memory().await.unwrap();
    let migrator = Migrator::new(db.clone());
    migrator.create_table("employees").await.unwrap();

    let columns = vec![
        Column::default_id(),
        Column::reference("manager", "employees", "id"),
    ];
    let ops = vec![DiffOp::Add {
        name: "manager".into(),
        datatype: DataType::ForeignKey,
        is_required: false,
    }];
    migrator
        .migrate_table("employees", columns.clone(), ops, true)
        .await
        .unwrap();
    assert_eq!(RowStore::list_columns(&db, "employees").await.unwrap(), columns);

    insert(
        &db,
        "employees",
        &[
            row(&[("id", Value::from(1)), ("manager", Value::Null)]),
            row(&[("id", Value::from(2)), ("manager", Value::from(1))]),
            row(&[("id", Value::from(3)), ("manager", Value::from(9))]),
        ],
    )
    .await;

    let outcome = migrator
        .migrate_table("employees", columns, vec![], true)
        .await
        .unwrap();
    assert_eq!(outcome.report.nulled_references[0].count, 1);
    assert_eq!(
        values(&read(&db, "employees").await, "manager"),
        vec![Value::Null, Value::Number(1.0), Value::Null]
    );
}

#[tokio::test]
async fn missing_referenced_table_fails_before_any_change() {
    let (migrator, db) = people_with_names().await;

    let columns = vec![
        Column::default_id(),
        Column::new("name", DataType::String),
        Column::reference("ghost", "ghosts", "id"),
    ];
    let err = migrator
        .migrate_table("people", columns, vec![], true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::ReferencedTableNotFound { ref column, ref table }
            if column == "ghost" && table == "ghosts"
    ));
    assert_eq!(read(&db, "people").await.len(), 3);
}

#[tokio::test]
async fn unknown_tables_and_invalid_columns_are_rejected() {
    let (migrator, _db) = people_with_names().await;

    let err = migrator
        .migrate_table("nope", vec![Column::default_id()], vec![], true)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::TableNotFound(ref t) if t == "nope"));

    let err = migrator
        .migrate_table("people", vec![], vec![], true)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::InvalidColumnSpec(_)));

    let err = migrator
        .migrate_table("__datapantry_metadata", vec![Column::default_id()], vec![], true)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::TableNotFound(_)));
}

#[tokio::test]
async fn concurrent_migration_of_the_same_table_is_refused() {
    let (migrator, _db) = people_with_names().await;
    let guard = migrator.locks().try_acquire(&["people"]).unwrap();

    let columns = vec![Column::default_id(), Column::new("name", DataType::String)];
    let err = migrator
        .migrate_table("people", columns.clone(), vec![], true)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::MigrationInFlight(ref t) if t == "people"));

    drop(guard);
    assert!(migrator
        .migrate_table("people", columns, vec![], true)
        .await
        .is_ok());
    assert!(!migrator.locks().is_locked("people"));
}

#[tokio::test]
async fn required_reference_without_target_aborts_and_keeps_original() {
    let db = PantryDb::open_memory().await.unwrap();
    let migrator = Migrator::new(db.clone());
    teams_and_people(&migrator, &db).await;
    insert(
        &db,
        "people",
        &[
            row(&[("id", Value::from(1)), ("team", Value::from(2))]),
            row(&[("id", Value::from(2)), ("team", Value::Null)]),
        ],
    )
    .await;

    let columns = vec![
        Column::default_id(),
        Column::reference("team", "teams", "id").required(),
    ];
    let ops = vec![DiffOp::RequiredChange {
        name: "team".into(),
        is_required: true,
    }];
    let err = migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::RequiredReferenceMissing { ref column, rows: 1 } if column == "team"
    ));
    assert_eq!(
        values(&read(&db, "people").await, "team"),
        vec![Value::Number(2.0), Value::Null]
    );
    assert_eq!(
        migrator.list_tables().await.unwrap(),
        vec!["people".to_string(), "teams".to_string()]
    );
    assert!(!migrator.locks().is_locked("people"));
}

#[tokio::test]
async fn successive_migrations_read_the_current_columns() {
    let (migrator, db) = people_with_names().await;

    let columns = vec![
        Column::default_id(),
        Column::new("name", DataType::String),
        Column::new("age", DataType::Number),
    ];
    let ops = vec![DiffOp::Add {
        name: "age".into(),
        datatype: DataType::Number,
        is_required: false,
    }];
    migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap();

    let columns = vec![Column::default_id(), Column::new("years", DataType::Number)];
    let ops = vec![
        DiffOp::Delete {
            name: "name".into(),
        },
        DiffOp::Rename {
            from: "age".into(),
            to: "years".into(),
        },
    ];
    let outcome = migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap();
    assert_eq!(outcome.rows_copied, 3);

    let rows = read(&db, "people").await;
    assert_eq!(values(&rows, "id"), vec![Value::from(1), Value::from(2), Value::from(3)]);
    assert_eq!(values(&rows, "years"), vec![Value::from(0); 3]);
    assert!(rows.iter().all(|r| !r.contains_key("name")));
}

#[tokio::test]
async fn unique_required_dates_receive_distinct_defaults() {
    let (migrator, db) = people_with_names().await;

    let columns = vec![
        Column::default_id(),
        Column::new("name", DataType::Date).unique().required(),
    ];
    let ops = vec![
        DiffOp::Retype {
            name: "name".into(),
            from: DataType::String,
            to: DataType::Date,
        },
        DiffOp::ConstraintChange {
            name: "name".into(),
            constraint: Constraint::Unique,
        },
        DiffOp::RequiredChange {
            name: "name".into(),
            is_required: true,
        },
    ];
    migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap();

    assert_eq!(
        values(&read(&db, "people").await, "name"),
        vec![
            Value::from("1970-01-01"),
            Value::from("1970-01-02"),
            Value::from("1970-01-03")
        ]
    );
}

#[tokio::test]
async fn unique_required_boolean_with_too_many_rows_is_rejected() {
    let db = PantryDb::open_memory().await.unwrap();
    let migrator = Migrator::new(db.clone());
    migrator.create_table("flags").await.unwrap();
    let columns = vec![Column::default_id(), Column::new("flag", DataType::Boolean)];
    let ops = vec![DiffOp::Add {
        name: "flag".into(),
        datatype: DataType::Boolean,
        is_required: false,
    }];
    migrator
        .migrate_table("flags", columns, ops, true)
        .await
        .unwrap();
    insert(
        &db,
        "flags",
        &[
            row(&[("id", Value::from(1)), ("flag", Value::Bool(true))]),
            row(&[("id", Value::from(2)), ("flag", Value::Bool(true))]),
            row(&[("id", Value::from(3)), ("flag", Value::Bool(false))]),
        ],
    )
    .await;

    let columns = vec![
        Column::default_id(),
        Column::new("flag", DataType::Boolean).unique().required(),
    ];
    let ops = vec![
        DiffOp::ConstraintChange {
            name: "flag".into(),
            constraint: Constraint::Unique,
        },
        DiffOp::RequiredChange {
            name: "flag".into(),
            is_required: true,
        },
    ];
    let err = migrator
        .migrate_table("flags", columns, ops, true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::DistinctValuesExhausted { ref column, rows: 1 } if column == "flag"
    ));
    assert_eq!(
        values(&read(&db, "flags").await, "flag"),
        vec![Value::Bool(true), Value::Bool(true), Value::Bool(false)]
    );
    assert_eq!(migrator.list_tables().await.unwrap(), vec!["flags".to_string()]);
    assert!(!migrator.locks().is_locked("flags"));
}

#[tokio::test]
async fn drop_table_clears_metadata_and_layout() {
    let (migrator, db) = people_with_names().await;
    db.set_subtype("people", "name", SubtypeTag::Date).await.unwrap();
    db.upsert_position("people", 1, 2).await.unwrap();

    let impact = migrator.table_impact("people").await.unwrap();
    assert_eq!(impact.row_count, 3);
    assert_eq!(impact.sample.len(), 3);

    migrator.drop_table("people").await.unwrap();

    assert!(migrator.list_tables().await.unwrap().is_empty());
    assert_eq!(db.get_subtype("people", "name").await.unwrap(), None);
    assert!(db.position("people").await.unwrap().is_none());

    let err = migrator.drop_table("people").await.unwrap_err();
    assert!(matches!(err, MigrationError::TableNotFound(_)));
}

#[tokio::test]
async fn create_table_rejects_existing_and_reserved_names() {
    let db = PantryDb::open_memory().await.unwrap();
    let migrator = Migrator::new(db);

    let columns = migrator.create_table("  orders ").await.unwrap();
    assert_eq!(columns, vec![Column::default_id()]);

    let description = migrator.describe_table("orders").await.unwrap();
    assert_eq!(description.columns, vec![Column::default_id()]);
    assert_eq!(description.row_count, 0);

    assert!(matches!(
        migrator.create_table("orders").await,
        Err(MigrationError::InvalidColumnSpec(_))
    ));
    assert!(matches!(
        migrator.create_table("__datapantry_positions").await,
        Err(MigrationError::InvalidColumnSpec(_))
    ));
    assert!(matches!(
        migrator.create_table("   ").await,
        Err(MigrationError::InvalidColumnSpec(_))
    ));
}

// ============================================================================
// Failure injection
// ============================================================================

/// Delegates to a real database but refuses every insert.
struct RejectingInserts {
    inner: PantryDb,
}

#[async_trait]
impl RowStore for RejectingInserts {
    async fn list_tables(&self) -> StoreResult<Vec<String>> {
        RowStore::list_tables(&self.inner).await
    }

    async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        RowStore::table_exists(&self.inner, table).await
    }

    async fn list_columns(&self, table: &str) -> StoreResult<Vec<Column>> {
        RowStore::list_columns(&self.inner, table).await
    }

    async fn list_rows(&self, table: &str, columns: &[Column]) -> StoreResult<Vec<Row>> {
        RowStore::list_rows(&self.inner, table, columns).await
    }

    async fn count_rows(&self, table: &str) -> StoreResult<u64> {
        RowStore::count_rows(&self.inner, table).await
    }

    async fn column_type(&self, table: &str, column: &str) -> StoreResult<Option<String>> {
        RowStore::column_type(&self.inner, table, column).await
    }

    async fn distinct_values(&self, table: &str, column: &str) -> StoreResult<Vec<Value>> {
        RowStore::distinct_values(&self.inner, table, column).await
    }

    async fn create_table(&self, name: &str, columns: &[PhysicalColumnDef]) -> StoreResult<()> {
        RowStore::create_table(&self.inner, name, columns).await
    }

    async fn bulk_insert(&self, table: &str, _columns: &[Column], _rows: &[Row]) -> StoreResult<u64> {
        Err(DbError::invalid_input(format!("inserts into {} are disabled", table)))
    }

    async fn drop_table(&self, name: &str) -> StoreResult<()> {
        RowStore::drop_table(&self.inner, name).await
    }

    async fn rename_table(&self, from: &str, to: &str) -> StoreResult<()> {
        RowStore::rename_table(&self.inner, from, to).await
    }
}

#[async_trait]
impl SubtypeStore for RejectingInserts {
    async fn get_subtype(&self, table: &str, column: &str) -> StoreResult<Option<SubtypeTag>> {
        self.inner.get_subtype(table, column).await
    }

    async fn set_subtype(&self, table: &str, column: &str, tag: SubtypeTag) -> StoreResult<()> {
        self.inner.set_subtype(table, column, tag).await
    }

    async fn clear_subtype(&self, table: &str, column: &str) -> StoreResult<()> {
        self.inner.clear_subtype(table, column).await
    }

    async fn clear_table_subtypes(&self, table: &str) -> StoreResult<()> {
        self.inner.clear_table_subtypes(table).await
    }
}

#[async_trait]
impl LayoutRefs for RejectingInserts {
    async fn rename_references(&self, from: &str, to: &str) -> StoreResult<()> {
        self.inner.rename_references(from, to).await
    }

    async fn delete_references(&self, table: &str) -> StoreResult<()> {
        self.inner.delete_references(table).await
    }
}

#[tokio::test]
async fn failed_copy_drops_the_shadow_and_keeps_the_original() {
    let (_, db) = people_with_names().await;
    let migrator = Migrator::new(RejectingInserts { inner: db.clone() });

    let columns = vec![
        Column::default_id(),
        Column::new("name", DataType::String).unique(),
    ];
    let ops = vec![DiffOp::ConstraintChange {
        name: "name".into(),
        constraint: Constraint::Unique,
    }];
    let err = migrator
        .migrate_table("people", columns, ops, true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::StorageFailure {
            stage: RebuildState::ShadowCreated,
            source: DbError::InvalidInput(_),
        }
    ));
    assert_eq!(
        RowStore::list_tables(&db).await.unwrap(),
        vec!["people".to_string()]
    );
    assert_eq!(
        values(&read(&db, "people").await, "name"),
        vec![Value::from("Lucy"), Value::from("Lucy"), Value::from("Max")]
    );
}
