//! MySQL / MariaDB dialect.

use crate::error::Result;
use crate::schema::{quote_literal, AbstractType, Column, ForeignKey, Index, TableState};

use super::Handler;

/// MySQL schema handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlHandler;

impl Handler for MySqlHandler {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn column_type(&self, column: &Column) -> String {
        match &column.abstract_type {
            AbstractType::Primary | AbstractType::Integer => "INT".to_string(),
            AbstractType::BigPrimary | AbstractType::BigInteger => "BIGINT".to_string(),
            AbstractType::Boolean => "TINYINT(1)".to_string(),
            AbstractType::TinyInteger => "TINYINT".to_string(),
            AbstractType::String(size) => format!("VARCHAR({size})"),
            AbstractType::TinyText => "TINYTEXT".to_string(),
            AbstractType::Text => "TEXT".to_string(),
            AbstractType::LongText => "LONGTEXT".to_string(),
            AbstractType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
            AbstractType::Double => "DOUBLE".to_string(),
            AbstractType::Float => "FLOAT".to_string(),
            AbstractType::Datetime => "DATETIME".to_string(),
            AbstractType::Date => "DATE".to_string(),
            AbstractType::Time => "TIME".to_string(),
            AbstractType::Timestamp => "TIMESTAMP".to_string(),
            AbstractType::TinyBinary => "TINYBLOB".to_string(),
            AbstractType::Binary => "BLOB".to_string(),
            AbstractType::LongBinary => "LONGBLOB".to_string(),
            AbstractType::Enum(values) => {
                let values: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
                format!("ENUM({})", values.join(","))
            }
            AbstractType::Json => "JSON".to_string(),
        }
    }

    fn column_suffix(&self, _table: &str, column: &Column) -> Option<String> {
        column
            .abstract_type
            .is_auto_increment()
            .then(|| "AUTO_INCREMENT".to_string())
    }

    fn table_options(&self, engine: Option<&str>) -> Option<String> {
        engine.map(|engine| format!("ENGINE = {engine}"))
    }

    // CHANGE handles renames and every attribute change in one statement.
    fn alter_column(&self, table: &str, from: &Column, to: &Column) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} CHANGE {} {}",
            self.quote_identifier(table),
            self.quote_identifier(&from.name),
            self.column_definition(table, to)
        )])
    }

    fn drop_index(&self, table: &str, index: &Index) -> String {
        format!(
            "ALTER TABLE {} DROP INDEX {}",
            self.quote_identifier(table),
            self.quote_identifier(&index.name)
        )
    }

    fn rename_index(&self, table: &str, from: &str, to: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} RENAME INDEX {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(from),
            self.quote_identifier(to)
        ))
    }

    fn drop_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<Vec<String>> {
        let table = self.quote_identifier(table);
        let mut sql = vec![format!(
            "ALTER TABLE {table} DROP FOREIGN KEY {}",
            self.quote_identifier(&foreign_key.name)
        )];
        // InnoDB keeps the supporting index after the constraint is gone.
        if let Some(index) = &foreign_key.backing_index {
            sql.push(format!(
                "ALTER TABLE {table} DROP INDEX {}",
                self.quote_identifier(index)
            ));
        }
        Ok(sql)
    }

    fn implicit_foreign_key_index(
        &self,
        table: &TableState,
        foreign_key: &ForeignKey,
    ) -> Option<String> {
        let leads = |columns: &[String]| columns.first() == Some(&foreign_key.column);
        let covered =
            leads(&table.primary_keys) || table.indexes.values().any(|i| leads(&i.columns));
        (!covered).then(|| foreign_key.name.clone())
    }

    fn alter_primary_keys(
        &self,
        table: &str,
        _constraint: Option<&str>,
        from: &[String],
        to: &[String],
    ) -> Result<Vec<String>> {
        let mut clauses = Vec::new();
        if !from.is_empty() {
            clauses.push("DROP PRIMARY KEY".to_string());
        }
        if !to.is_empty() {
            clauses.push(format!("ADD PRIMARY KEY ({})", self.quote_columns(to)));
        }
        if clauses.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![format!(
            "ALTER TABLE {} {}",
            self.quote_identifier(table),
            clauses.join(", ")
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DefaultValue;

    fn handler() -> MySqlHandler {
        MySqlHandler
    }

    #[test]
    fn test_create_table_with_engine() {
        let mut state = TableState::new("users");
        state.register_column(Column::new("id", AbstractType::Primary));
        let mut active = Column::new("active", AbstractType::Boolean);
        active.not_null().default_value(DefaultValue::Bool(false));
        state.register_column(active);
        state.register_column(Column::new(
            "role",
            AbstractType::Enum(vec!["admin".into(), "user".into()]),
        ));
        state.primary_keys = vec!["id".into()];

        assert_eq!(
            handler().create_table(&state, Some("InnoDB"), false),
            "CREATE TABLE `users` (\n  \
             `id` INT NOT NULL AUTO_INCREMENT,\n  \
             `active` TINYINT(1) NOT NULL DEFAULT 0,\n  \
             `role` ENUM('admin','user'),\n  \
             PRIMARY KEY (`id`)\n) ENGINE = InnoDB"
        );
    }

    #[test]
    fn test_change_column() {
        let from = Column::new("name", AbstractType::String(100));
        let mut to = Column::new("full_name", AbstractType::String(255));
        to.not_null();
        assert_eq!(
            handler().alter_column("users", &from, &to).unwrap(),
            vec!["ALTER TABLE `users` CHANGE `name` `full_name` VARCHAR(255) NOT NULL"]
        );
    }

    #[test]
    fn test_index_and_foreign_key_drops() {
        let index = Index::new("users_index_email", vec!["email".into()]);
        assert_eq!(
            handler().drop_index("users", &index),
            "ALTER TABLE `users` DROP INDEX `users_index_email`"
        );

        let mut fk = ForeignKey::new("posts_foreign_user_id", "user_id", "users", "id");
        assert_eq!(
            handler().drop_foreign_key("posts", &fk).unwrap(),
            vec!["ALTER TABLE `posts` DROP FOREIGN KEY `posts_foreign_user_id`"]
        );

        fk.backing_index = Some("posts_foreign_user_id".into());
        assert_eq!(
            handler().drop_foreign_key("posts", &fk).unwrap(),
            vec![
                "ALTER TABLE `posts` DROP FOREIGN KEY `posts_foreign_user_id`",
                "ALTER TABLE `posts` DROP INDEX `posts_foreign_user_id`",
            ]
        );
    }

    #[test]
    fn test_implicit_index_only_without_a_leading_index() {
        let mut state = TableState::new("posts");
        state.register_column(Column::new("id", AbstractType::Primary));
        state.register_column(Column::new("user_id", AbstractType::Integer));
        state.primary_keys = vec!["id".into()];
        let fk = ForeignKey::new("posts_foreign_user_id", "user_id", "users", "id");

        assert_eq!(
            handler().implicit_foreign_key_index(&state, &fk).as_deref(),
            Some("posts_foreign_user_id")
        );

        state.register_index(Index::new(
            "posts_index_user_id_id",
            vec!["user_id".into(), "id".into()],
        ));
        assert_eq!(handler().implicit_foreign_key_index(&state, &fk), None);
    }

    #[test]
    fn test_primary_key_change_is_one_statement() {
        let sql = handler()
            .alter_primary_keys("tags", None, &["id".to_string()], &["slug".to_string()])
            .unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE `tags` DROP PRIMARY KEY, ADD PRIMARY KEY (`slug`)"]
        );
    }
}
