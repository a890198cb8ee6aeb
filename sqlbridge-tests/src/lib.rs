//! Driver-independent integration scenarios. Each driver crate runs these
//! against its own backend; a scenario receives an open database and a table
//! prefix so parallel suites never collide.

use futures::FutureExt;
use sqlbridge::{
    eq, in_list, transact, Consequence, Dialect, Error, FieldSpec, FkConstraint, Requirement,
    Result, SqlDb, SqlType, SqlValue, Table, TableName,
};
use std::collections::BTreeSet;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_logs() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn addresses_fields() -> Vec<FieldSpec> {
    vec![FieldSpec::new("identity", SqlType::Int64).auto()]
}

fn persons_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("pk", SqlType::Int64).auto(),
        FieldSpec::new("name", SqlType::Varchar).size(64),
        FieldSpec::new("addresspk", SqlType::Int64)
            .nullable()
            .references("addresses", "identity")
            .on_update(Consequence::Restrict)
            .on_delete(Consequence::Cascade),
    ]
}

fn create_table_sql(dialect: &Dialect, name: &TableName, fields: &[FieldSpec]) -> Result<String> {
    let mut sql = format!("CREATE TABLE {} (", name.quoted(dialect));
    let mut constraints = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        field.validate()?;
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&dialect.quote(&field.name));
        sql.push(' ');
        sql.push_str(&dialect.field_ddl(field));
        if let Some(fk) = FkConstraint::of_field(field) {
            constraints.push(fk);
        }
    }
    for (i, fk) in constraints.iter().enumerate() {
        sql.push_str(", ");
        sql.push_str(&fk.constraint_sql(dialect, name, i)?);
    }
    sql.push(')');
    Ok(sql)
}

/// The fixture every scenario builds on: four addresses, two persons living
/// at the first two.
pub struct Fixture {
    pub addresses: TableName,
    pub persons: TableName,
    pub constraint: FkConstraint,
}

impl Fixture {
    pub async fn create(db: &dyn SqlDb, prefix: &str) -> Fixture {
        let dialect = db.dialect();
        let addresses = TableName::new(prefix, "addresses");
        let persons = TableName::new(prefix, "persons");
        let execer = db.as_execer();

        for table in [&persons, &addresses] {
            let sql = format!("DROP TABLE IF EXISTS {}", table.quoted(&dialect));
            execer.exec(&sql, &[]).await.unwrap();
        }
        let sql = create_table_sql(&dialect, &addresses, &addresses_fields()).unwrap();
        execer.exec(&sql, &[]).await.unwrap();
        let sql = create_table_sql(&dialect, &persons, &persons_fields()).unwrap();
        execer.exec(&sql, &[]).await.unwrap();

        let insert_address = format!(
            "INSERT INTO {} ({}) VALUES (?)",
            addresses.quoted(&dialect),
            dialect.quote("identity")
        );
        for id in 1..=4i64 {
            execer.exec(&insert_address, &[id.into()]).await.unwrap();
        }
        let insert_person = format!(
            "INSERT INTO {} ({}, {}) VALUES (?,?)",
            persons.quoted(&dialect),
            dialect.quote("name"),
            dialect.quote("addresspk")
        );
        for (name, address) in [("Ada", 1i64), ("Grace", 2)] {
            let key = execer
                .insert(&insert_person, "pk", &[name.into(), address.into()])
                .await
                .unwrap();
            assert!(key > 0, "generated keys start at 1, got {}", key);
        }

        let constraint = FkConstraint::of_field(&persons_fields()[2]).unwrap();
        Fixture {
            addresses,
            persons,
            constraint,
        }
    }
}

/// Round-trips values and row counts through plain queries and the table
/// helper.
pub async fn crud_scenario(db: &dyn SqlDb, prefix: &str) {
    init_logs();
    let fixture = Fixture::create(db, prefix).await;
    let dialect = db.dialect();
    let execer = db.as_execer();

    db.ping().await.unwrap();

    let addresses = Table::new(execer, fixture.addresses.clone());
    assert_eq!(addresses.count().await.unwrap(), 4);

    let persons = Table::new(execer, fixture.persons.clone());
    assert_eq!(persons.count().await.unwrap(), 2);
    assert_eq!(
        persons.count_where(&eq("name", "Ada")).await.unwrap(),
        1
    );
    let ids = persons
        .select_i64s("pk", &in_list("addresspk", [1i64, 2]))
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?",
        dialect.quote("name"),
        fixture.persons.quoted(&dialect),
        dialect.quote("addresspk")
    );
    let row = execer.query_row(&sql, &[2i64.into()]).await.unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&SqlValue::Text("Grace".into())));
    assert!(execer.query_row(&sql, &[99i64.into()]).await.unwrap().is_none());

    let update = format!(
        "UPDATE {} SET {} = ? WHERE {} = ?",
        fixture.persons.quoted(&dialect),
        dialect.quote("name"),
        dialect.quote("pk")
    );
    let affected = execer
        .exec(&update, &["Ada Lovelace".into(), 1i64.into()])
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let gone = addresses
        .delete(&eq("identity", 4i64), Requirement::One)
        .await
        .unwrap();
    assert_eq!(gone, 1);
    assert_eq!(addresses.count().await.unwrap(), 3);
}

/// Wrong-size failures carry a readable message and stay classifiable.
pub async fn requirement_scenario(db: &dyn SqlDb, prefix: &str) {
    init_logs();
    let fixture = Fixture::create(db, prefix).await;
    let dialect = db.dialect();
    let execer = db.as_execer();
    let addresses = Table::new(execer, fixture.addresses.clone());

    let sql = format!("SELECT * FROM {}", fixture.addresses.quoted(&dialect));
    let err = addresses
        .query_with(Requirement::Exactly(2), &sql, &[])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "expected to fetch 2 but got 4");
    assert_eq!(err.size(), Some(4));
    assert!(err.is_not_unique());

    let missing = addresses
        .query_with(
            Requirement::One,
            &format!("{} WHERE {} = ?", sql, dialect.quote("identity")),
            &[99i64.into()],
        )
        .await
        .unwrap_err();
    assert!(missing.is_not_found());

    let none = addresses
        .delete(&eq("identity", 99i64), Requirement::One)
        .await
        .unwrap_err();
    assert_eq!(none.to_string(), "expected to change 1 but changed 0");
}

/// The resolver reports which parent keys the child table uses, and the two
/// sets partition the parent.
pub async fn relationship_scenario(db: &dyn SqlDb, prefix: &str) {
    init_logs();
    let fixture = Fixture::create(db, prefix).await;
    let execer = db.as_execer();
    let relationship = fixture.constraint.relationship_with(&fixture.persons);

    let used = relationship.ids_used_as_foreign_keys(execer).await.unwrap();
    assert_eq!(used, BTreeSet::from([1, 2]));

    let unused = relationship
        .ids_unused_as_foreign_keys(execer)
        .await
        .unwrap();
    assert_eq!(unused, BTreeSet::from([3, 4]));

    assert!(used.is_disjoint(&unused));
    let all: BTreeSet<i64> = used.union(&unused).copied().collect();
    assert_eq!(all, BTreeSet::from([1, 2, 3, 4]));
}

/// Commit persists, error rolls back, and a panic inside the closure is
/// converted into an error while the pool stays usable.
pub async fn transaction_scenario(db: &dyn SqlDb, prefix: &str) {
    init_logs();
    let fixture = Fixture::create(db, prefix).await;
    let dialect = db.dialect();
    let execer = db.as_execer();
    let insert = format!(
        "INSERT INTO {} ({}) VALUES (?)",
        fixture.addresses.quoted(&dialect),
        dialect.quote("identity")
    );
    let addresses = Table::new(execer, fixture.addresses.clone());

    transact(execer, |tx| {
        let insert = insert.clone();
        async move {
            tx.exec(&insert, &[10i64.into()]).await?;
            tx.exec(&insert, &[11i64.into()]).await?;
            Ok(())
        }
        .boxed()
    })
    .await
    .unwrap();
    assert_eq!(addresses.count().await.unwrap(), 6);

    let failed: Result<()> = transact(execer, |tx| {
        let insert = insert.clone();
        async move {
            tx.exec(&insert, &[12i64.into()]).await?;
            Err(Error::Unsupported("abort on purpose".into()))
        }
        .boxed()
    })
    .await;
    assert!(failed.is_err());
    assert_eq!(addresses.count().await.unwrap(), 6);

    let aborted: Result<()> = transact(execer, |tx| {
        let insert = insert.clone();
        async move {
            tx.exec(&insert, &[13i64.into()]).await?;
            panic!("boom");
        }
        .boxed()
    })
    .await;
    match aborted {
        Err(Error::TransactionAborted { message, .. }) => assert!(message.contains("boom")),
        other => panic!("expected an aborted transaction, got {:?}", other.err()),
    }
    assert_eq!(addresses.count().await.unwrap(), 6);

    db.ping().await.unwrap();
}

/// A transaction dropped without commit or rollback leaves no trace behind
/// and the pool keeps serving.
pub async fn abandoned_transaction_scenario(db: &dyn SqlDb, prefix: &str) {
    init_logs();
    let fixture = Fixture::create(db, prefix).await;
    let dialect = db.dialect();
    let execer = db.as_execer();
    let insert = format!(
        "INSERT INTO {} ({}) VALUES (?)",
        fixture.addresses.quoted(&dialect),
        dialect.quote("identity")
    );

    let tx = execer.begin().await.unwrap();
    tx.as_execer().exec(&insert, &[30i64.into()]).await.unwrap();
    drop(tx);

    let addresses = Table::new(execer, fixture.addresses.clone());
    assert_eq!(addresses.count().await.unwrap(), 4);
    db.ping().await.unwrap();
}

/// A closure already inside a transaction joins it instead of nesting.
pub async fn nested_transact_scenario(db: &dyn SqlDb, prefix: &str) {
    init_logs();
    let fixture = Fixture::create(db, prefix).await;
    let dialect = db.dialect();
    let execer = db.as_execer();
    let insert = format!(
        "INSERT INTO {} ({}) VALUES (?)",
        fixture.addresses.quoted(&dialect),
        dialect.quote("identity")
    );

    transact(execer, |tx| {
        let insert = insert.clone();
        async move {
            tx.exec(&insert, &[20i64.into()]).await?;
            transact(tx, |inner| {
                let insert = insert.clone();
                async move {
                    inner.exec(&insert, &[21i64.into()]).await?;
                    Ok(())
                }
                .boxed()
            })
            .await
        }
        .boxed()
    })
    .await
    .unwrap();

    let addresses = Table::new(execer, fixture.addresses.clone());
    assert_eq!(addresses.count().await.unwrap(), 6);
}

/// Statements survive a server-side prepare, and broken SQL does not.
pub async fn prepare_scenario(db: &dyn SqlDb, prefix: &str) {
    init_logs();
    let fixture = Fixture::create(db, prefix).await;
    let dialect = db.dialect();
    let conn = db.acquire().await.unwrap();

    let sql = format!(
        "SELECT * FROM {} WHERE {} = ?",
        fixture.addresses.quoted(&dialect),
        dialect.quote("identity")
    );
    conn.prepare(&sql).await.unwrap();
    let rows = conn.query(&sql, &[1i64.into()]).await.unwrap();
    assert_eq!(rows.len(), 1);

    assert!(conn.prepare("SELECT definitely not sql").await.is_err());
}

/// Runs every scenario in sequence. The fixture is rebuilt each time, so
/// the whole thing is idempotent.
pub async fn full_suite(db: &dyn SqlDb, prefix: &str) {
    crud_scenario(db, prefix).await;
    requirement_scenario(db, prefix).await;
    relationship_scenario(db, prefix).await;
    transaction_scenario(db, prefix).await;
    abandoned_transaction_scenario(db, prefix).await;
    nested_transact_scenario(db, prefix).await;
    prepare_scenario(db, prefix).await;
}
