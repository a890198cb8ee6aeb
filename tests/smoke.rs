use indoc::indoc;
use sqlbridge::{
    eq, gt_eq, open_with, DbConfig, Dialect, Error, Requirement, SqlValue, Table, TableName,
};
use std::time::Duration;

fn memory_config() -> DbConfig {
    DbConfig {
        url: "sqlite::memory:".to_string(),
        driver: "sqlite".to_string(),
        dialect: Dialect::sqlite(),
        max_connections: 1,
        connect_delay: Duration::ZERO,
        connect_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn open_query_filter_delete() {
    let db = open_with(&memory_config()).await.unwrap();
    let execer = db.as_execer();

    execer
        .exec(
            indoc! {r#"
                CREATE TABLE "games" (
                    "pk" integer not null primary key autoincrement,
                    "title" text not null,
                    "year" integer not null
                )
            "#},
            &[],
        )
        .await
        .unwrap();
    for (title, year) in [("spacewar", 1962), ("adventure", 1977), ("rogue", 1980)] {
        let key = execer
            .insert(
                r#"INSERT INTO "games" ("title", "year") VALUES (?,?)"#,
                "pk",
                &[title.into(), (year as i64).into()],
            )
            .await
            .unwrap();
        assert!(key > 0);
    }

    let games = Table::new(execer, TableName::plain("games"));
    assert_eq!(games.count().await.unwrap(), 3);
    assert_eq!(
        games
            .count_where(&gt_eq("year", 1977i64).and(eq("title", "rogue")))
            .await
            .unwrap(),
        1
    );

    let row = execer
        .query_row(
            r#"SELECT "title" FROM "games" WHERE "year" = ?"#,
            &[1977i64.into()],
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("title"), Some(&SqlValue::Text("adventure".into())));

    let removed = games
        .delete(&eq("title", "spacewar"), Requirement::One)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    db.close().await;
}

#[tokio::test]
async fn driver_aliases_are_accepted() {
    let mut config = memory_config();
    config.driver = "sqlite3".to_string();
    let db = open_with(&config).await.unwrap();
    db.ping().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn unknown_driver_is_rejected() {
    let mut config = memory_config();
    config.driver = "oracle".to_string();
    let err = open_with(&config).await.err().unwrap();
    assert!(matches!(err, Error::Unsupported(_)));
}
