//! マスタカタログとマイグレーションの列定義が食い違っていないことを検証する。

use yeelo_erp_server::domain::catalog::MasterCatalog;
use yeelo_erp_server::domain::entity::master_schema::FieldType;

const MASTERS_SQL: &str = include_str!("../migrations/20260101000001_create_masters.sql");

/// `CREATE TABLE masters.{table} (` から対応する `);` までの列定義行を返す。
fn table_columns(table: &str) -> Option<Vec<&'static str>> {
    let header = format!("CREATE TABLE masters.{table} (");
    let start = MASTERS_SQL.find(&header)? + header.len();
    let body = &MASTERS_SQL[start..];
    let end = body.find("\n);")?;
    Some(
        body[..end]
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("--"))
            .collect(),
    )
}

fn column_line<'a>(columns: &[&'a str], key: &str) -> Option<&'a str> {
    let prefix = format!("{key} ");
    columns.iter().copied().find(|l| l.starts_with(&prefix))
}

#[test]
fn test_every_master_has_a_table() {
    let catalog = MasterCatalog::builtin();
    for schema in catalog.list() {
        assert!(
            table_columns(&schema.table).is_some(),
            "missing table masters.{}",
            schema.table
        );
    }
}

#[test]
fn test_every_field_has_a_column() {
    let catalog = MasterCatalog::builtin();
    for schema in catalog.list() {
        let columns = table_columns(&schema.table).unwrap();
        for key in ["id", "created_at", "updated_at", "created_by", "updated_by"] {
            assert!(
                column_line(&columns, key).is_some(),
                "masters.{} has no {key} column",
                schema.table
            );
        }
        for field in &schema.fields {
            assert!(
                column_line(&columns, &field.key).is_some(),
                "masters.{} has no column for {}",
                schema.table,
                field.key
            );
        }
    }
}

#[test]
fn test_unique_and_reference_constraints_match() {
    let catalog = MasterCatalog::builtin();
    for schema in catalog.list() {
        let columns = table_columns(&schema.table).unwrap();
        for field in &schema.fields {
            let line = column_line(&columns, &field.key).unwrap();
            assert_eq!(
                line.contains("UNIQUE"),
                field.unique,
                "masters.{}.{} unique constraint mismatch",
                schema.table,
                field.key
            );
            if field.field_type == FieldType::Reference {
                let target = field
                    .references
                    .as_deref()
                    .and_then(|t| catalog.get(t))
                    .unwrap();
                assert!(
                    line.contains(&format!("REFERENCES masters.{} (id)", target.table)),
                    "masters.{}.{} must reference masters.{}",
                    schema.table,
                    field.key,
                    target.table
                );
            }
        }
    }
}

#[test]
fn test_column_types_follow_field_types() {
    let catalog = MasterCatalog::builtin();
    for schema in catalog.list() {
        let columns = table_columns(&schema.table).unwrap();
        for field in &schema.fields {
            let line = column_line(&columns, &field.key).unwrap();
            let expected = format!("{} {}", field.key, field.field_type.column_type());
            assert!(
                line.starts_with(&expected),
                "masters.{}: expected `{expected}`, got `{line}`",
                schema.table
            );
        }
    }
}
