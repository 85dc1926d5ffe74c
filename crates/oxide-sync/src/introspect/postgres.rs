//! PostgreSQL introspection via `information_schema` and `pg_catalog`.

use std::collections::HashMap;

use indexmap::IndexMap;
use sqlx::postgres::PgPool;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::schema::{
    AbstractType, Column, DefaultValue, ForeignKey, ForeignKeyAction, Index, TableState,
};

use super::{quoted_literals, Introspector};

const TABLE_OID: &str = "SELECT c.oid::int8 FROM pg_class c \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     WHERE c.relname = $1 AND n.nspname = current_schema() AND c.relkind IN ('r', 'p')";

const COLUMNS: &str = "SELECT column_name::text, data_type::text, is_nullable::text, \
     column_default::text, character_maximum_length::int4, numeric_precision::int4, \
     numeric_scale::int4, is_identity::text \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 \
     ORDER BY ordinal_position";

const PRIMARY_KEY: &str = "SELECT a.attname::text FROM pg_index i \
     JOIN LATERAL unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) ON true \
     JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum \
     WHERE i.indrelid = $1::int8::oid AND i.indisprimary \
     ORDER BY k.ord";

const PRIMARY_KEY_NAME: &str = "SELECT conname::text FROM pg_constraint \
     WHERE conrelid = $1::int8::oid AND contype = 'p'";

const INDEXES: &str = "SELECT ic.relname::text, i.indisunique, a.attname::text FROM pg_index i \
     JOIN pg_class ic ON ic.oid = i.indexrelid \
     JOIN LATERAL unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) ON true \
     JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum \
     WHERE i.indrelid = $1::int8::oid AND NOT i.indisprimary \
     ORDER BY ic.relname, k.ord";

const FOREIGN_KEYS: &str = "SELECT con.conname::text, a.attname::text, ft.relname::text, \
     fa.attname::text, con.confdeltype::text, con.confupdtype::text, \
     array_length(con.conkey, 1)::int4 \
     FROM pg_constraint con \
     JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1] \
     JOIN pg_class ft ON ft.oid = con.confrelid \
     JOIN pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = con.confkey[1] \
     WHERE con.conrelid = $1::int8::oid AND con.contype = 'f' \
     ORDER BY con.conname";

const CHECKS: &str = "SELECT a.attname::text, pg_get_constraintdef(con.oid)::text \
     FROM pg_constraint con \
     JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1] \
     WHERE con.conrelid = $1::int8::oid AND con.contype = 'c' \
     AND array_length(con.conkey, 1) = 1";

type ColumnRow = (
    String,
    String,
    String,
    Option<String>,
    Option<i32>,
    Option<i32>,
    Option<i32>,
    String,
);

/// PostgreSQL catalog reader (tables of the current schema).
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresIntrospector;

impl PostgresIntrospector {
    fn parse_type(table: &str, row: &ColumnRow) -> Result<AbstractType> {
        let (name, data_type, _, default, length, precision, scale, identity) = row;
        let sequence = identity == "YES"
            || default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));
        let small = |value: &Option<i32>, fallback: u8| {
            value.and_then(|v| u8::try_from(v).ok()).unwrap_or(fallback)
        };

        let ty = match data_type.as_str() {
            "integer" if sequence => AbstractType::Primary,
            "bigint" if sequence => AbstractType::BigPrimary,
            "integer" => AbstractType::Integer,
            "bigint" => AbstractType::BigInteger,
            "smallint" => AbstractType::TinyInteger,
            "boolean" => AbstractType::Boolean,
            "character varying" | "character" => {
                AbstractType::String(length.and_then(|l| u32::try_from(l).ok()).unwrap_or(255))
            }
            "text" => AbstractType::Text,
            "numeric" => AbstractType::Decimal {
                precision: small(precision, 10),
                scale: small(scale, 0),
            },
            "double precision" => AbstractType::Double,
            "real" => AbstractType::Float,
            "timestamp without time zone" => AbstractType::Datetime,
            "timestamp with time zone" => AbstractType::Timestamp,
            "date" => AbstractType::Date,
            "time without time zone" | "time with time zone" => AbstractType::Time,
            "bytea" => AbstractType::Binary,
            "json" | "jsonb" => AbstractType::Json,
            other => {
                return Err(SyncError::introspection(
                    table,
                    format!("unsupported type '{other}' for column '{name}'"),
                ))
            }
        };
        Ok(ty)
    }

    fn action(table: &str, code: &str) -> Result<ForeignKeyAction> {
        match code {
            "a" => Ok(ForeignKeyAction::NoAction),
            "r" => Ok(ForeignKeyAction::Restrict),
            "c" => Ok(ForeignKeyAction::Cascade),
            "n" => Ok(ForeignKeyAction::SetNull),
            "d" => Ok(ForeignKeyAction::SetDefault),
            other => Err(SyncError::introspection(
                table,
                format!("unknown referential action code '{other}'"),
            )),
        }
    }
}

impl Introspector for PostgresIntrospector {
    type Pool = PgPool;

    async fn introspect(&self, pool: &PgPool, table: &str) -> Result<TableState> {
        let mut state = TableState::new(table);
        let failed = |e: sqlx::Error| SyncError::introspection(table, e);

        let oid: Option<(i64,)> = sqlx::query_as(TABLE_OID)
            .bind(table)
            .fetch_optional(pool)
            .await
            .map_err(failed)?;
        let Some((oid,)) = oid else {
            debug!(table, "Table does not exist");
            return Ok(state);
        };

        let checks: Vec<(String, String)> = sqlx::query_as(CHECKS)
            .bind(oid)
            .fetch_all(pool)
            .await
            .map_err(failed)?;
        let enums: HashMap<String, Vec<String>> = checks
            .into_iter()
            .filter(|(_, definition)| {
                definition.contains(" IN (") || definition.contains("= ANY")
            })
            .map(|(column, definition)| (column, quoted_literals(&definition)))
            .filter(|(_, values)| !values.is_empty())
            .collect();

        let columns: Vec<ColumnRow> = sqlx::query_as(COLUMNS)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(failed)?;
        for row in &columns {
            let mut ty = Self::parse_type(table, row)?;
            let (name, _, nullable, default, ..) = row;
            if let Some(values) = enums.get(name) {
                if matches!(ty, AbstractType::String(_)) {
                    ty = AbstractType::Enum(values.clone());
                }
            }

            let mut column = Column::new(name.clone(), ty.clone());
            column.nullable(nullable == "YES");
            if !ty.is_auto_increment() {
                column.default = default
                    .as_deref()
                    .and_then(|raw| DefaultValue::from_sql(raw, &ty));
            }
            state.register_column(column);
        }

        let primary_keys: Vec<(String,)> = sqlx::query_as(PRIMARY_KEY)
            .bind(oid)
            .fetch_all(pool)
            .await
            .map_err(failed)?;
        state.primary_keys = primary_keys.into_iter().map(|(c,)| c).collect();

        let primary_key_name: Option<(String,)> = sqlx::query_as(PRIMARY_KEY_NAME)
            .bind(oid)
            .fetch_optional(pool)
            .await
            .map_err(failed)?;
        state.primary_key_name = primary_key_name.map(|(name,)| name);

        let index_rows: Vec<(String, bool, String)> = sqlx::query_as(INDEXES)
            .bind(oid)
            .fetch_all(pool)
            .await
            .map_err(failed)?;
        let mut indexes: IndexMap<String, Index> = IndexMap::new();
        for (name, unique, column) in index_rows {
            indexes
                .entry(name.clone())
                .or_insert_with(|| {
                    let mut index = Index::new(name, Vec::new());
                    index.unique(unique);
                    index
                })
                .columns
                .push(column);
        }
        for index in indexes.into_values() {
            state.register_index(index);
        }

        let fk_rows: Vec<(String, String, String, String, String, String, i32)> =
            sqlx::query_as(FOREIGN_KEYS)
                .bind(oid)
                .fetch_all(pool)
                .await
                .map_err(failed)?;
        for (name, column, foreign_table, foreign_key, on_delete, on_update, arity) in fk_rows {
            if arity != 1 {
                warn!(table, constraint = %name, "Skipping composite foreign key");
                continue;
            }
            let mut fk = ForeignKey::new(name, column, foreign_table, foreign_key);
            fk.on_delete(Self::action(table, &on_delete)?)
                .on_update(Self::action(table, &on_update)?);
            state.register_foreign_key(fk);
        }

        Ok(state)
    }
}
