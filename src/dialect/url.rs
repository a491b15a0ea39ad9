//! Connection string rewriting and target extraction.
//!
//! Every rewrite rule is idempotent: applying it twice with the same database
//! name yields the same string. Input without a recognizable scheme is returned
//! unchanged.

use crate::models::DialectTag;

/// Point a connection string at another database.
pub fn rewrite(tag: DialectTag, connection_string: &str, database: &str) -> String {
    let database = database.trim();
    if database.is_empty() || !has_scheme(connection_string) {
        return connection_string.to_string();
    }

    match tag {
        DialectTag::MySQL
        | DialectTag::MariaDB
        | DialectTag::PostgreSQL
        | DialectTag::DB2
        | DialectTag::Sybase => rewrite_path_segment(connection_string, database),
        DialectTag::SQLServer => rewrite_database_property(connection_string, database),
        DialectTag::Oracle => rewrite_oracle(connection_string, database),
        DialectTag::Derby => rewrite_derby(connection_string, database),
        DialectTag::H2 => rewrite_trailing_segment(connection_string, database, &[':', '/']),
        DialectTag::MongoDB => rewrite_mongo(connection_string, database),
        DialectTag::SQLite | DialectTag::Unknown => connection_string.to_string(),
    }
}

fn has_scheme(connection_string: &str) -> bool {
    connection_string
        .split_once(':')
        .is_some_and(|(scheme, _)| {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        })
}

/// Byte offset right after the `//` authority marker, or after the scheme
/// prefix when there is none.
fn authority_start(s: &str) -> usize {
    s.find("//").map(|idx| idx + 2).unwrap_or(0)
}

/// `.../segment[;props|:props][?query]`
fn rewrite_path_segment(cs: &str, database: &str) -> String {
    let (base, query) = split_once_keep(cs, '?');
    let start = authority_start(base);

    match base[start..].find('/') {
        Some(rel) => {
            let seg_start = start + rel + 1;
            let seg_end = base[seg_start..]
                .find([';', ':'])
                .map(|i| seg_start + i)
                .unwrap_or(base.len());
            format!("{}{}{}{}", &base[..seg_start], database, &base[seg_end..], query)
        }
        None => {
            let sep = if base.ends_with(':') || base.ends_with('/') {
                ""
            } else {
                "/"
            };
            format!("{}{}{}{}", base, sep, database, query)
        }
    }
}

/// `;databaseName=value` for SQL Server and jTDS.
fn rewrite_database_property(cs: &str, database: &str) -> String {
    const KEY: &str = "databasename=";
    let lower = cs.to_ascii_lowercase();

    match lower.find(KEY) {
        Some(idx) => {
            let value_start = idx + KEY.len();
            let value_end = cs[value_start..]
                .find(';')
                .map(|i| value_start + i)
                .unwrap_or(cs.len());
            format!("{}{}{}", &cs[..value_start], database, &cs[value_end..])
        }
        None if cs.ends_with(';') => format!("{}databaseName={}", cs, database),
        None => format!("{};databaseName={}", cs, database),
    }
}

/// SID form `@host:port:sid` swaps the part after the last colon; service
/// form `@//host:port/service` swaps the part after the last slash.
fn rewrite_oracle(cs: &str, database: &str) -> String {
    let after_at = cs.rfind('@').map(|i| i + 1).unwrap_or(0);
    let target = &cs[after_at..];

    if target.starts_with("//") {
        if let Some(idx) = target.rfind('/').filter(|&i| i > 1) {
            return format!("{}{}", &cs[..after_at + idx + 1], database);
        }
        return format!("{}/{}", cs, database);
    }

    match cs.rfind(':') {
        Some(idx) => format!("{}{}", &cs[..idx + 1], database),
        None => cs.to_string(),
    }
}

/// Derby: `jdbc:derby://host:port/db;props` or `jdbc:derby:[subprotocol:]db;props`.
fn rewrite_derby(cs: &str, database: &str) -> String {
    let (base, props) = split_once_keep(cs, ';');
    if !base.contains("//") {
        return rewrite_trailing_segment(cs, database, &[':']);
    }

    // Network form: the database is the path after the authority
    let start = authority_start(base);
    match base[start..].find('/') {
        Some(rel) => format!("{}{}{}", &base[..start + rel + 1], database, props),
        None => format!("{}/{}{}", base, database, props),
    }
}

/// Replace the last delimited segment before any `;properties` tail.
fn rewrite_trailing_segment(cs: &str, database: &str, delimiters: &[char]) -> String {
    let (base, props) = split_once_keep(cs, ';');
    match base.rfind(delimiters) {
        Some(idx) => format!("{}{}{}", &base[..idx + 1], database, props),
        None => cs.to_string(),
    }
}

/// `mongodb://[credentials@]hosts[/database][?options]`
fn rewrite_mongo(cs: &str, database: &str) -> String {
    let (base, options) = split_once_keep(cs, '?');
    let Some(scheme_end) = base.find("://").map(|i| i + 3) else {
        return cs.to_string();
    };

    match base[scheme_end..].find('/') {
        Some(rel) => format!("{}{}{}", &base[..scheme_end + rel + 1], database, options),
        None => format!("{}/{}{}", base, database, options),
    }
}

/// Split at the first `delim`, keeping the delimiter on the tail.
fn split_once_keep(s: &str, delim: char) -> (&str, &str) {
    match s.find(delim) {
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    }
}

/// Host a connection string points at.
///
/// File-based and in-memory engines report `localhost`.
pub fn extract_host(tag: DialectTag, connection_string: &str) -> String {
    let cs = connection_string.trim();
    match tag {
        DialectTag::H2 | DialectTag::SQLite | DialectTag::Derby
            if !cs.contains("//") =>
        {
            "localhost".to_string()
        }
        DialectTag::MongoDB => {
            let Some(scheme_end) = cs.find("://").map(|i| i + 3) else {
                return "localhost".to_string();
            };
            let rest = &cs[scheme_end..];
            let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
            host_of(rest.split(['/', '?']).next().unwrap_or(rest))
        }
        DialectTag::Oracle if cs.contains('@') => {
            let after_at = cs.rsplit_once('@').map(|(_, r)| r).unwrap_or(cs);
            let after_at = after_at.trim_start_matches('/');
            host_of(after_at.split(['/', ':']).next().unwrap_or(after_at))
        }
        DialectTag::Sybase if !cs.contains("//") => match tds_address(cs) {
            Some(address) => host_of(address.split('/').next().unwrap_or(address)),
            None => "localhost".to_string(),
        },
        _ => match cs.find("//") {
            Some(idx) => {
                let rest = &cs[idx + 2..];
                let rest = rest
                    .split(['/', ';', '?'])
                    .next()
                    .unwrap_or(rest);
                let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
                host_of(rest)
            }
            None => "localhost".to_string(),
        },
    }
}

/// First host of a `host[:port][,host2...]` list.
fn host_of(host_port: &str) -> String {
    let first = host_port.split(',').next().unwrap_or(host_port);
    let host = if first.starts_with('[') {
        // IPv6 literal
        first.split_once(']').map(|(h, _)| &h[1..]).unwrap_or(first)
    } else {
        first.split(':').next().unwrap_or(first)
    };
    if host.is_empty() {
        "localhost".to_string()
    } else {
        host.to_string()
    }
}

/// Database a connection string targets, if it names one.
pub fn extract_database(tag: DialectTag, connection_string: &str) -> Option<String> {
    let cs = connection_string.trim();
    let found = match tag {
        DialectTag::H2 => {
            let (base, _) = split_once_keep(cs, ';');
            base.rsplit([':', '/']).next().map(str::to_string)
        }
        DialectTag::SQLite => {
            let path = cs.strip_prefix("jdbc:").unwrap_or(cs);
            let path = path.strip_prefix("sqlite:").unwrap_or(path);
            let path = path.trim_start_matches("//");
            let (path, _) = split_once_keep(path, '?');
            std::path::Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        }
        DialectTag::Derby if !cs.contains("//") => {
            let (base, _) = split_once_keep(cs, ';');
            base.rsplit(':')
                .next()
                .map(|db| db.trim_matches('/').replace('/', "_"))
        }
        DialectTag::SQLServer => {
            let lower = cs.to_ascii_lowercase();
            match lower.find("databasename=") {
                Some(idx) => {
                    let value = &cs[idx + "databasename=".len()..];
                    value.split(';').next().map(str::to_string)
                }
                // jTDS also accepts the database as a path segment
                None => generic_path_database(cs),
            }
        }
        DialectTag::Oracle => {
            let after_at = cs.rsplit_once('@').map(|(_, r)| r)?;
            if after_at.starts_with("//") {
                after_at.rsplit_once('/').map(|(_, s)| s.to_string())
            } else {
                let parts: Vec<&str> = after_at.split(':').collect();
                parts
                    .get(2)
                    .or(parts.last())
                    .map(|s| s.to_string())
            }
        }
        DialectTag::Sybase if !cs.contains("//") => tds_address(cs)
            .and_then(|address| address.split_once('/'))
            .and_then(|(_, db)| db.split(['?', ';']).next())
            .map(str::to_string),
        DialectTag::MongoDB => {
            let (base, _) = split_once_keep(cs, '?');
            let scheme_end = base.find("://")? + 3;
            base[scheme_end..]
                .split_once('/')
                .map(|(_, db)| db.to_string())
        }
        _ => generic_path_database(cs),
    };

    found.filter(|db| !db.is_empty())
}

/// `host:port/database` after the `Tds:` marker of a jConnect URL.
fn tds_address(cs: &str) -> Option<&str> {
    let idx = cs.to_ascii_lowercase().find("tds:")?;
    Some(&cs[idx + "tds:".len()..])
}

/// `//host:port/database[;...|?...]`
fn generic_path_database(cs: &str) -> Option<String> {
    let idx = cs.find("//")?;
    let after = &cs[idx + 2..];
    let (_, path) = after.split_once('/')?;
    path.split(['?', ';', ':']).next().map(str::to_string)
}
