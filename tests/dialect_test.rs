//! Properties of classification, URL rewriting and SQL normalization.

use db_studio::dialect::{
    classify, extract_database, extract_host, normalize_limit, paginate, rewrite,
};
use db_studio::models::{ConnectionDescriptor, DialectTag};

/// One representative connection string per dialect.
const SAMPLES: &[(DialectTag, &str)] = &[
    (DialectTag::MySQL, "jdbc:mysql://localhost:3306/shop?useSSL=false"),
    (DialectTag::MariaDB, "jdbc:mariadb://db.internal/shop"),
    (DialectTag::PostgreSQL, "jdbc:postgresql://pg:5432/analytics"),
    (
        DialectTag::SQLServer,
        "jdbc:sqlserver://mssql:1433;databaseName=Sales;encrypt=false",
    ),
    (DialectTag::SQLServer, "jdbc:jtds:sqlserver://mssql:1433/Sales"),
    (DialectTag::Oracle, "jdbc:oracle:thin:@ora:1521:ORCL"),
    (DialectTag::Oracle, "jdbc:oracle:thin:@//ora:1521/service"),
    (DialectTag::DB2, "jdbc:db2://db2:50000/SAMPLE"),
    (DialectTag::Sybase, "jdbc:sybase:Tds:ase:5000/pubs2"),
    (DialectTag::Derby, "jdbc:derby://localhost:1527/demo;create=true"),
    (DialectTag::H2, "jdbc:h2:mem:testdb"),
    (DialectTag::SQLite, "jdbc:sqlite:/var/data/app.db"),
    (DialectTag::MongoDB, "mongodb://admin:pw@mongo:27017/app?authSource=admin"),
];

#[test]
fn test_samples_classify_to_their_dialect() {
    for (tag, cs) in SAMPLES {
        let descriptor = ConnectionDescriptor::new(*cs, "", "");
        assert_eq!(classify(&descriptor), *tag, "{}", cs);
    }
}

#[test]
fn test_classify_is_total() {
    for cs in [
        "",
        "   ",
        ":",
        "jdbc:",
        "jdbc::",
        "not a url",
        "jdbc:unknownvendor://h/db",
        "mysqlx://h/db",
        "ЖЖЖ://юникод",
        "jdbc:mysql",
    ] {
        let descriptor = ConnectionDescriptor::new(cs, "", "");
        let _ = classify(&descriptor);
    }
    let descriptor = ConnectionDescriptor::new("jdbc:unknownvendor://h/db", "", "");
    assert_eq!(classify(&descriptor), DialectTag::Unknown);
}

#[test]
fn test_rewrite_is_idempotent() {
    for (tag, cs) in SAMPLES {
        for database in ["target", "other_db", "X"] {
            let once = rewrite(*tag, cs, database);
            let twice = rewrite(*tag, &once, database);
            assert_eq!(once, twice, "{} {}", tag, cs);
        }
    }
}

#[test]
fn test_rewrite_targets_new_database() {
    for (tag, cs) in SAMPLES {
        if matches!(tag, DialectTag::SQLite) {
            continue;
        }
        let rewritten = rewrite(*tag, cs, "target");
        assert_eq!(
            extract_database(*tag, &rewritten).as_deref(),
            Some("target"),
            "{} -> {}",
            cs,
            rewritten
        );
        assert_eq!(extract_host(*tag, &rewritten), extract_host(*tag, cs));
    }
}

#[test]
fn test_rewrite_mongo_examples() {
    assert_eq!(
        rewrite(DialectTag::MongoDB, "mongodb://h/olddb?x=1", "newdb"),
        "mongodb://h/newdb?x=1"
    );
    assert_eq!(
        rewrite(DialectTag::MongoDB, "mongodb://h", "newdb"),
        "mongodb://h/newdb"
    );
}

#[test]
fn test_normalize_limit_is_noop_for_native_limit() {
    let sql = "select * from t limit 10";
    for tag in [
        DialectTag::MySQL,
        DialectTag::MariaDB,
        DialectTag::PostgreSQL,
        DialectTag::SQLite,
        DialectTag::MongoDB,
    ] {
        assert_eq!(normalize_limit(tag, sql), sql);
    }
}

#[test]
fn test_normalize_limit_translations() {
    assert_eq!(
        normalize_limit(DialectTag::SQLServer, "select * from t limit 10"),
        "SELECT TOP 10 * from t"
    );
    assert_eq!(
        normalize_limit(DialectTag::Oracle, "select * from t limit 10"),
        "select * from t FETCH FIRST 10 ROWS ONLY"
    );
}

#[test]
fn test_paginate_examples() {
    let paged = paginate(DialectTag::PostgreSQL, "select * from t", 2, 20);
    assert!(paged.ends_with("LIMIT 20 OFFSET 20"), "{}", paged);

    let update = "update t set a = 1";
    assert_eq!(paginate(DialectTag::PostgreSQL, update, 2, 20), update);
}

#[test]
fn test_host_extraction() {
    let hosts: Vec<String> = SAMPLES
        .iter()
        .map(|(tag, cs)| extract_host(*tag, cs))
        .collect();
    assert_eq!(
        hosts,
        vec![
            "localhost", "db.internal", "pg", "mssql", "mssql", "ora", "ora", "db2", "ase",
            "localhost", "localhost", "localhost", "mongo",
        ]
    );
}
