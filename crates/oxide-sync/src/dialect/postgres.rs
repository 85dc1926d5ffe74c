//! PostgreSQL dialect.

use crate::error::Result;
use crate::operation::Operation;
use crate::schema::{quote_literal, AbstractType, Column, DefaultValue, ForeignKey};

use super::{unsupported, Handler};

/// PostgreSQL schema handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresHandler;

impl PostgresHandler {
    /// Type used in `ALTER COLUMN ... TYPE`, where pseudo-types such as
    /// `SERIAL` are not accepted.
    fn storage_type(&self, column: &Column) -> String {
        match column.abstract_type {
            AbstractType::Primary => "INTEGER".to_string(),
            AbstractType::BigPrimary => "BIGINT".to_string(),
            _ => self.column_type(column),
        }
    }

    fn enum_constraint_name(table: &str, column: &str) -> String {
        format!("{table}_{column}_enum")
    }

    fn enum_check(&self, column: &Column) -> Option<String> {
        column.abstract_type.enum_values().map(|values| {
            let values: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
            format!(
                "CHECK ({} IN ({}))",
                self.quote_identifier(&column.name),
                values.join(", ")
            )
        })
    }
}

impl Handler for PostgresHandler {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn column_type(&self, column: &Column) -> String {
        match &column.abstract_type {
            AbstractType::Primary => "SERIAL".to_string(),
            AbstractType::BigPrimary => "BIGSERIAL".to_string(),
            AbstractType::Boolean => "BOOLEAN".to_string(),
            AbstractType::TinyInteger => "SMALLINT".to_string(),
            AbstractType::Integer => "INTEGER".to_string(),
            AbstractType::BigInteger => "BIGINT".to_string(),
            AbstractType::String(size) => format!("VARCHAR({size})"),
            AbstractType::TinyText | AbstractType::Text | AbstractType::LongText => {
                "TEXT".to_string()
            }
            AbstractType::Decimal { precision, scale } => format!("NUMERIC({precision},{scale})"),
            AbstractType::Double => "DOUBLE PRECISION".to_string(),
            AbstractType::Float => "REAL".to_string(),
            AbstractType::Datetime => "TIMESTAMP".to_string(),
            AbstractType::Timestamp => "TIMESTAMPTZ".to_string(),
            AbstractType::Date => "DATE".to_string(),
            AbstractType::Time => "TIME".to_string(),
            AbstractType::TinyBinary | AbstractType::Binary | AbstractType::LongBinary => {
                "BYTEA".to_string()
            }
            AbstractType::Enum(_) => format!("VARCHAR({})", column.abstract_type.enum_size()),
            AbstractType::Json => "JSON".to_string(),
        }
    }

    fn render_default(&self, value: &DefaultValue, _column: &Column) -> String {
        match value {
            DefaultValue::Bool(true) => "TRUE".to_string(),
            DefaultValue::Bool(false) => "FALSE".to_string(),
            other => other.to_sql(),
        }
    }

    fn column_suffix(&self, table: &str, column: &Column) -> Option<String> {
        self.enum_check(column).map(|check| {
            format!(
                "CONSTRAINT {} {}",
                self.quote_identifier(&Self::enum_constraint_name(table, &column.name)),
                check
            )
        })
    }

    fn alter_column(&self, table: &str, from: &Column, to: &Column) -> Result<Vec<String>> {
        if to.abstract_type.is_auto_increment() && !from.abstract_type.is_auto_increment() {
            return Err(unsupported(
                self.name(),
                &Operation::AlterColumn {
                    table: table.to_string(),
                    from: from.clone(),
                    to: to.clone(),
                },
            ));
        }

        let prefix = format!("ALTER TABLE {}", self.quote_identifier(table));
        let column = self.quote_identifier(&to.name);
        let mut sql = Vec::new();

        if from.name != to.name {
            sql.push(format!(
                "{} RENAME COLUMN {} TO {}",
                prefix,
                self.quote_identifier(&from.name),
                column
            ));
        }

        let retyped = self.storage_type(from) != self.storage_type(to);
        let enum_changed = from.abstract_type.enum_values() != to.abstract_type.enum_values();
        let default_changed =
            !DefaultValue::equivalent(from.default.as_ref(), to.default.as_ref());

        if enum_changed && from.abstract_type.enum_values().is_some() {
            sql.push(format!(
                "{} DROP CONSTRAINT IF EXISTS {}",
                prefix,
                self.quote_identifier(&Self::enum_constraint_name(table, &from.name))
            ));
        }

        // An old default may not cast to the new type.
        let reset_default = retyped && from.default.is_some();
        if reset_default {
            sql.push(format!("{prefix} ALTER COLUMN {column} DROP DEFAULT"));
        }

        if retyped {
            let ty = self.storage_type(to);
            sql.push(format!(
                "{prefix} ALTER COLUMN {column} TYPE {ty} USING {column}::{ty}"
            ));
        }

        if enum_changed {
            if let Some(check) = self.enum_check(to) {
                sql.push(format!(
                    "{} ADD CONSTRAINT {} {}",
                    prefix,
                    self.quote_identifier(&Self::enum_constraint_name(table, &to.name)),
                    check
                ));
            }
        }

        if from.nullable != to.nullable {
            let action = if to.nullable { "DROP" } else { "SET" };
            sql.push(format!("{prefix} ALTER COLUMN {column} {action} NOT NULL"));
        }

        if !to.abstract_type.is_auto_increment() && (default_changed || reset_default) {
            match &to.default {
                Some(default) => sql.push(format!(
                    "{} ALTER COLUMN {} SET DEFAULT {}",
                    prefix,
                    column,
                    self.render_default(default, to)
                )),
                None if !reset_default => {
                    sql.push(format!("{prefix} ALTER COLUMN {column} DROP DEFAULT"));
                }
                None => {}
            }
        }

        Ok(sql)
    }

    fn drop_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(&foreign_key.name)
        )])
    }

    fn alter_primary_keys(
        &self,
        table: &str,
        constraint: Option<&str>,
        from: &[String],
        to: &[String],
    ) -> Result<Vec<String>> {
        let prefix = format!("ALTER TABLE {}", self.quote_identifier(table));
        // The replacement keeps the existing name so later changes find it.
        let name = constraint.map_or_else(|| format!("{table}_pkey"), str::to_string);
        let name = self.quote_identifier(&name);
        let mut sql = Vec::new();
        if !from.is_empty() {
            sql.push(format!("{prefix} DROP CONSTRAINT {name}"));
        }
        if !to.is_empty() {
            sql.push(format!(
                "{prefix} ADD CONSTRAINT {name} PRIMARY KEY ({})",
                self.quote_columns(to)
            ));
        }
        Ok(sql)
    }

    fn rename_index(&self, _table: &str, from: &str, to: &str) -> Option<String> {
        Some(format!(
            "ALTER INDEX {} RENAME TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyAction, Index, TableState};

    fn handler() -> PostgresHandler {
        PostgresHandler
    }

    #[test]
    fn test_create_table() {
        let mut state = TableState::new("users");
        state.register_column(Column::new("id", AbstractType::Primary));
        let mut active = Column::new("active", AbstractType::Boolean);
        active.not_null().default_value(DefaultValue::Bool(true));
        state.register_column(active);
        state.register_column(Column::new(
            "role",
            AbstractType::Enum(vec!["admin".into(), "user".into()]),
        ));
        state.primary_keys = vec!["id".into()];

        assert_eq!(
            handler().create_table(&state, Some("InnoDB"), false),
            "CREATE TABLE \"users\" (\n  \
             \"id\" SERIAL NOT NULL,\n  \
             \"active\" BOOLEAN NOT NULL DEFAULT TRUE,\n  \
             \"role\" VARCHAR(5) CONSTRAINT \"users_role_enum\" CHECK (\"role\" IN ('admin', 'user')),\n  \
             PRIMARY KEY (\"id\")\n)"
        );
    }

    #[test]
    fn test_alter_column_type_nullability_and_default() {
        let from = Column::new("age", AbstractType::Integer);
        let mut to = Column::new("age", AbstractType::BigInteger);
        to.not_null().default_value(DefaultValue::Integer(0));

        let sql = handler().alter_column("users", &from, &to).unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE BIGINT USING \"age\"::BIGINT",
                "ALTER TABLE \"users\" ALTER COLUMN \"age\" SET NOT NULL",
                "ALTER TABLE \"users\" ALTER COLUMN \"age\" SET DEFAULT 0",
            ]
        );
    }

    #[test]
    fn test_alter_column_rename_only() {
        let from = Column::new("name", AbstractType::String(255));
        let to = Column::new("full_name", AbstractType::String(255));
        let sql = handler().alter_column("users", &from, &to).unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"full_name\""]
        );
    }

    #[test]
    fn test_alter_column_enum_values() {
        let from = Column::new("status", AbstractType::Enum(vec!["a".into()]));
        let to = Column::new("status", AbstractType::Enum(vec!["a".into(), "b".into()]));
        let sql = handler().alter_column("posts", &from, &to).unwrap();
        assert_eq!(sql.len(), 2);
        assert_eq!(
            sql[0],
            "ALTER TABLE \"posts\" DROP CONSTRAINT IF EXISTS \"posts_status_enum\""
        );
        assert!(sql[1].ends_with("CHECK (\"status\" IN ('a', 'b'))"));
    }

    #[test]
    fn test_alter_to_primary_is_unsupported() {
        let from = Column::new("id", AbstractType::Integer);
        let to = Column::new("id", AbstractType::Primary);
        assert!(handler().alter_column("users", &from, &to).is_err());

        let to = Column::new("id", AbstractType::BigPrimary);
        let from = Column::new("id", AbstractType::Primary);
        assert_eq!(
            handler().alter_column("users", &from, &to).unwrap(),
            vec!["ALTER TABLE \"users\" ALTER COLUMN \"id\" TYPE BIGINT USING \"id\"::BIGINT"]
        );
    }

    #[test]
    fn test_foreign_keys() {
        let mut fk = ForeignKey::new("posts_foreign_user_id", "user_id", "users", "id");
        fk.on_delete(ForeignKeyAction::SetNull);
        let add = handler()
            .generate_sql(&Operation::AddForeignKey {
                table: "posts".into(),
                foreign_key: fk.clone(),
            })
            .unwrap();
        assert_eq!(
            add[0],
            "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_foreign_user_id\" FOREIGN KEY (\"user_id\") \
             REFERENCES \"users\" (\"id\") ON DELETE SET NULL ON UPDATE NO ACTION"
        );

        let drop = handler().drop_foreign_key("posts", &fk).unwrap();
        assert_eq!(
            drop[0],
            "ALTER TABLE \"posts\" DROP CONSTRAINT \"posts_foreign_user_id\""
        );
    }

    #[test]
    fn test_primary_key_change() {
        let sql = handler()
            .alter_primary_keys(
                "tags",
                None,
                &["id".to_string()],
                &["id".to_string(), "slug".to_string()],
            )
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"tags\" DROP CONSTRAINT \"tags_pkey\"",
                "ALTER TABLE \"tags\" ADD CONSTRAINT \"tags_pkey\" PRIMARY KEY (\"id\", \"slug\")",
            ]
        );
    }

    #[test]
    fn test_primary_key_change_keeps_catalog_name() {
        let sql = handler()
            .alter_primary_keys(
                "tags",
                Some("tags_pk_custom"),
                &["id".to_string()],
                &["slug".to_string()],
            )
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"tags\" DROP CONSTRAINT \"tags_pk_custom\"",
                "ALTER TABLE \"tags\" ADD CONSTRAINT \"tags_pk_custom\" PRIMARY KEY (\"slug\")",
            ]
        );
    }

    #[test]
    fn test_index_rename() {
        let from = Index::new("old", vec!["email".into()]);
        let to = Index::new("new", vec!["email".into()]);
        assert_eq!(
            handler().alter_index("users", &from, &to),
            vec!["ALTER INDEX \"old\" RENAME TO \"new\""]
        );
    }
}
