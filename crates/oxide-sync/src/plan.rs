//! Synchronization planning.
//!
//! Planning turns a set of tables into ordered DDL without touching a
//! database. Statements are grouped by connection group and sequenced in
//! four phases so that foreign keys never point at missing tables or
//! columns, and constraints never block a drop:
//!
//! 1. [`Phase::DropForeignKeys`]
//! 2. [`Phase::DropIndexes`]
//! 3. [`Phase::Changes`]: tables, columns, primary keys and indexes
//! 4. [`Phase::CreateForeignKeys`]
//!
//! Within a phase, tables are visited in dependency order.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::comparator::TableDiff;
use crate::dialect::{Dialect, Handler};
use crate::error::{Result, SyncError};
use crate::graph::DependencyGraph;
use crate::operation::Operation;
use crate::schema::{Column, Index, Table};

/// Execution phase of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Drop removed or altered foreign keys.
    DropForeignKeys,
    /// Drop removed indexes.
    DropIndexes,
    /// Create, drop and alter tables, columns, primary keys and indexes.
    Changes,
    /// Create new or altered foreign keys.
    CreateForeignKeys,
}

impl Phase {
    /// All phases, in execution order.
    pub const ALL: [Self; 4] = [
        Self::DropForeignKeys,
        Self::DropIndexes,
        Self::Changes,
        Self::CreateForeignKeys,
    ];

    /// Returns the phase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DropForeignKeys => "drop_foreign_keys",
            Self::DropIndexes => "drop_indexes",
            Self::Changes => "changes",
            Self::CreateForeignKeys => "create_foreign_keys",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One operation, scheduled in a phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// Phase the operation runs in.
    pub phase: Phase,
    /// The operation.
    pub operation: Operation,
}

/// One SQL statement, scheduled in a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    /// Phase the statement runs in.
    pub phase: Phase,
    /// Table the statement belongs to.
    pub table: String,
    /// SQL text.
    pub sql: String,
}

/// Everything to execute on one connection group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupPlan {
    /// Database (connection group) name.
    pub database: String,
    /// Dialect of the group.
    pub dialect: Dialect,
    /// Table names, in dependency order.
    pub tables: Vec<String>,
    /// Operations, in execution order.
    pub steps: Vec<Step>,
    /// SQL statements, in execution order.
    pub statements: Vec<Statement>,
    /// Positions of the group's tables in the planned slice.
    #[serde(skip)]
    pub(crate) members: Vec<usize>,
}

impl GroupPlan {
    /// Returns true if the group has nothing to execute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements of one phase.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &Statement> {
        self.statements.iter().filter(move |s| s.phase == phase)
    }
}

/// The full synchronization plan of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncPlan {
    /// Groups, in order of first appearance.
    pub groups: Vec<GroupPlan>,
}

/// How a table is brought to its declared state.
enum Action {
    Create,
    Drop,
    Rebuild,
    Alter,
}

struct Planned<'a> {
    table: &'a Table,
    diff: TableDiff,
    action: Action,
}

impl SyncPlan {
    /// Plans the synchronization of `tables`.
    ///
    /// Fails if a declaration is invalid or if a passive table has pending
    /// changes; no plan is produced in that case.
    pub fn build(tables: &[Table]) -> Result<Self> {
        for table in tables {
            table.validate()?;
        }
        for table in tables {
            check_passive(table)?;
        }

        let order = DependencyGraph::new(tables).sort();
        let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for i in order {
            groups.entry(tables[i].database()).or_default().push(i);
        }

        let groups = groups
            .into_iter()
            .map(|(database, members)| plan_group(database, tables, members))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { groups })
    }

    /// Returns true if no group has anything to execute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(GroupPlan::is_empty)
    }

    /// Every statement of every group, in execution order.
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.groups.iter().flat_map(|g| g.statements.iter())
    }

    /// Returns the plan of one group.
    #[must_use]
    pub fn group(&self, database: &str) -> Option<&GroupPlan> {
        self.groups.iter().find(|g| g.database == database)
    }
}

fn check_passive(table: &Table) -> Result<()> {
    if !table.is_passive() {
        return Ok(());
    }
    let diff = table.diff();
    if diff.is_empty() {
        return Ok(());
    }
    Err(SyncError::DiffConflict {
        table: table.name().to_string(),
        columns: diff.column_names(),
        indexes: diff.index_names(),
        foreign_keys: diff.foreign_key_names(),
    })
}

fn plan_group(database: &str, tables: &[Table], members: Vec<usize>) -> Result<GroupPlan> {
    let dialect = tables[members[0]].dialect();
    let handler = dialect.handler();

    let planned: Vec<Planned<'_>> = members
        .iter()
        .filter_map(|&i| {
            let table = &tables[i];
            let diff = table.diff();
            let action = if table.is_dropped() {
                table.exists().then_some(Action::Drop)?
            } else if !table.exists() {
                (!table.current().columns.is_empty()).then_some(Action::Create)?
            } else if diff.is_empty() {
                return None;
            } else if handler.requires_rebuild(&diff) {
                Action::Rebuild
            } else {
                Action::Alter
            };
            Some(Planned {
                table,
                diff,
                action,
            })
        })
        .collect();

    let mut steps = Vec::new();
    for phase in Phase::ALL {
        for entry in &planned {
            for operation in operations(phase, entry, handler) {
                steps.push(Step { phase, operation });
            }
        }
    }

    let mut statements = Vec::new();
    for step in &steps {
        debug!(database, phase = %step.phase, operation = %step.operation.describe(), "Planned");
        for sql in handler.generate_sql(&step.operation)? {
            statements.push(Statement {
                phase: step.phase,
                table: step.operation.table().to_string(),
                sql,
            });
        }
    }

    Ok(GroupPlan {
        database: database.to_string(),
        dialect,
        tables: members.iter().map(|&i| tables[i].name().to_string()).collect(),
        steps,
        statements,
        members,
    })
}

/// A pure index rename can be applied in place; anything else is a drop
/// in phase 2 and a create in phase 3. Renamed columns are followed by the
/// database, so they count under their initial names.
fn is_rename(table: &Table, from: &Index, to: &Index) -> bool {
    let columns = to.columns.iter().map(|name| {
        table
            .current()
            .column(name)
            .and_then(Column::initial_name)
            .unwrap_or(name.as_str())
    });
    from.unique == to.unique && columns.eq(from.columns.iter().map(String::as_str))
}

fn operations(phase: Phase, entry: &Planned<'_>, handler: &dyn Handler) -> Vec<Operation> {
    let table = entry.table;
    let diff = &entry.diff;
    let name = table.name().to_string();
    let inline = handler.inline_foreign_keys();

    match (phase, &entry.action) {
        (Phase::DropForeignKeys, Action::Drop) if !inline => table
            .initial()
            .foreign_keys
            .values()
            .map(|fk| Operation::DropForeignKey {
                table: name.clone(),
                foreign_key: fk.clone(),
            })
            .collect(),
        (Phase::DropForeignKeys, Action::Alter) => diff
            .dropped_foreign_keys
            .iter()
            .chain(diff.altered_foreign_keys.iter().map(|c| &c.from))
            .map(|fk| Operation::DropForeignKey {
                table: name.clone(),
                foreign_key: fk.clone(),
            })
            .collect(),

        (Phase::DropIndexes, Action::Alter) => diff
            .dropped_indexes
            .iter()
            .chain(
                diff.altered_indexes
                    .iter()
                    .filter(|c| !is_rename(table, &c.from, &c.to))
                    .map(|c| &c.from),
            )
            .map(|index| Operation::DropIndex {
                table: name.clone(),
                index: index.clone(),
            })
            .collect(),

        (Phase::Changes, Action::Create) => {
            let current = table.current();
            let mut ops = vec![Operation::CreateTable {
                table: current.clone(),
                engine: table.engine().map(str::to_string),
                include_foreign_keys: inline,
            }];
            ops.extend(current.indexes.values().map(|index| Operation::AddIndex {
                table: name.clone(),
                index: index.clone(),
            }));
            ops
        }
        (Phase::Changes, Action::Drop) => vec![Operation::DropTable { table: name }],
        (Phase::Changes, Action::Rebuild) => vec![Operation::RebuildTable {
            from: table.initial().clone(),
            to: table.current().clone(),
        }],
        (Phase::Changes, Action::Alter) => {
            let mut ops = Vec::new();
            ops.extend(diff.dropped_columns.iter().map(|c| Operation::DropColumn {
                table: name.clone(),
                column: c.name.clone(),
            }));
            // Renames run before additions so a freed name can be reused.
            ops.extend(diff.altered_columns.iter().map(|c| Operation::AlterColumn {
                table: name.clone(),
                from: c.from.clone(),
                to: c.to.clone(),
            }));
            ops.extend(diff.added_columns.iter().map(|c| Operation::AddColumn {
                table: name.clone(),
                column: c.clone(),
            }));
            if diff.primary_keys_changed {
                ops.push(Operation::AlterPrimaryKeys {
                    table: name.clone(),
                    constraint: table.initial().primary_key_name.clone(),
                    from: table.initial().primary_keys.clone(),
                    to: table.current().primary_keys.clone(),
                });
            }
            for change in &diff.altered_indexes {
                if is_rename(table, &change.from, &change.to) {
                    ops.push(Operation::AlterIndex {
                        table: name.clone(),
                        from: change.from.clone(),
                        to: change.to.clone(),
                    });
                } else {
                    ops.push(Operation::AddIndex {
                        table: name.clone(),
                        index: change.to.clone(),
                    });
                }
            }
            ops.extend(diff.added_indexes.iter().map(|index| Operation::AddIndex {
                table: name.clone(),
                index: index.clone(),
            }));
            ops
        }

        (Phase::CreateForeignKeys, Action::Create) if !inline => table
            .current()
            .foreign_keys
            .values()
            .map(|fk| Operation::AddForeignKey {
                table: name.clone(),
                foreign_key: fk.clone(),
            })
            .collect(),
        (Phase::CreateForeignKeys, Action::Alter) => diff
            .added_foreign_keys
            .iter()
            .chain(diff.altered_foreign_keys.iter().map(|c| &c.to))
            .map(|fk| Operation::AddForeignKey {
                table: name.clone(),
                foreign_key: fk.clone(),
            })
            .collect(),

        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AbstractType, Column, ForeignKey, ForeignKeyAction, TableState};

    fn users_state() -> TableState {
        let mut state = TableState::new("users");
        state.register_column(Column::new("id", AbstractType::Primary));
        state.primary_keys = vec!["id".into()];
        state
    }

    fn sqls(plan: &SyncPlan, phase: Phase) -> Vec<String> {
        plan.groups
            .iter()
            .flat_map(|g| g.phase(phase))
            .map(|s| s.sql.clone())
            .collect()
    }

    #[test]
    fn test_create_table_then_indexes() {
        let mut users = Table::new("users", "default", Dialect::Sqlite);
        users.primary("id");
        users.string("email", 255).not_null();
        users.unique(&["email"]);

        let plan = SyncPlan::build(&[users]).unwrap();
        let changes = sqls(&plan, Phase::Changes);
        assert_eq!(changes.len(), 2);
        assert!(changes[0].starts_with("CREATE TABLE \"users\""));
        assert_eq!(
            changes[1],
            "CREATE UNIQUE INDEX \"users_index_email\" ON \"users\" (\"email\")"
        );
        assert!(sqls(&plan, Phase::CreateForeignKeys).is_empty());
    }

    #[test]
    fn test_adding_foreign_key_only_touches_last_phase() {
        let users = Table::from_state(users_state(), "default", Dialect::Postgres);
        let mut posts_state = TableState::new("posts");
        posts_state.register_column(Column::new("id", AbstractType::Primary));
        posts_state.register_column(Column::new("user_id", AbstractType::Integer));
        posts_state.primary_keys = vec!["id".into()];
        let mut posts = Table::from_state(posts_state, "default", Dialect::Postgres);
        posts
            .foreign_key("user_id", "users", "id")
            .on_delete(ForeignKeyAction::Cascade);

        let plan = SyncPlan::build(&[posts, users]).unwrap();
        for phase in [Phase::DropForeignKeys, Phase::DropIndexes, Phase::Changes] {
            assert!(sqls(&plan, phase).is_empty(), "{phase} should be empty");
        }
        assert_eq!(
            sqls(&plan, Phase::CreateForeignKeys),
            vec![
                "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_foreign_user_id\" \
                 FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") \
                 ON DELETE CASCADE ON UPDATE NO ACTION"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_cyclic_tables_get_foreign_keys_after_creation() {
        let mut a = Table::new("a", "default", Dialect::Postgres);
        a.primary("id");
        a.integer("b_id");
        a.foreign_key("b_id", "b", "id");
        let mut b = Table::new("b", "default", Dialect::Postgres);
        b.primary("id");
        b.integer("a_id");
        b.foreign_key("a_id", "a", "id");

        let plan = SyncPlan::build(&[a, b]).unwrap();
        let changes = sqls(&plan, Phase::Changes);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|sql| !sql.contains("FOREIGN KEY")));
        assert_eq!(sqls(&plan, Phase::CreateForeignKeys).len(), 2);
    }

    #[test]
    fn test_sqlite_folds_foreign_keys_into_create() {
        let users = Table::from_state(users_state(), "default", Dialect::Sqlite);
        let mut posts = Table::new("posts", "default", Dialect::Sqlite);
        posts.primary("id");
        posts.integer("user_id");
        posts.foreign_key("user_id", "users", "id");

        let plan = SyncPlan::build(&[posts, users]).unwrap();
        assert_eq!(plan.groups[0].tables, vec!["users", "posts"]);
        let changes = sqls(&plan, Phase::Changes);
        assert_eq!(changes.len(), 1);
        assert!(changes[0].contains("FOREIGN KEY (\"user_id\") REFERENCES \"users\""));
        assert!(sqls(&plan, Phase::CreateForeignKeys).is_empty());
    }

    #[test]
    fn test_sqlite_alter_column_is_rebuilt() {
        let mut state = users_state();
        state.register_column(Column::new("name", AbstractType::String(100)));
        let mut users = Table::from_state(state, "default", Dialect::Sqlite);
        users.string("name", 200);

        let plan = SyncPlan::build(&[users]).unwrap();
        let steps = &plan.groups[0].steps;
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].phase, Phase::Changes);
        assert!(matches!(steps[0].operation, Operation::RebuildTable { .. }));
    }

    #[test]
    fn test_dropped_table() {
        let mut users = Table::from_state(users_state(), "default", Dialect::Postgres);
        users.declare_dropped();
        let plan = SyncPlan::build(&[users]).unwrap();
        assert_eq!(sqls(&plan, Phase::Changes), vec!["DROP TABLE \"users\"".to_string()]);

        let mut ghost = Table::new("ghost", "default", Dialect::Postgres);
        ghost.declare_dropped();
        assert!(SyncPlan::build(&[ghost]).unwrap().is_empty());
    }

    #[test]
    fn test_altered_foreign_key_is_dropped_then_recreated() {
        let mut posts_state = TableState::new("posts");
        posts_state.register_column(Column::new("id", AbstractType::Primary));
        posts_state.register_column(Column::new("user_id", AbstractType::Integer));
        posts_state.primary_keys = vec!["id".into()];
        posts_state.register_foreign_key(ForeignKey::new(
            "posts_foreign_user_id",
            "user_id",
            "users",
            "id",
        ));
        let mut posts = Table::from_state(posts_state, "default", Dialect::MySql);
        posts
            .foreign_key("user_id", "users", "id")
            .on_delete(ForeignKeyAction::SetNull);

        let plan = SyncPlan::build(&[posts]).unwrap();
        assert_eq!(
            sqls(&plan, Phase::DropForeignKeys),
            vec!["ALTER TABLE `posts` DROP FOREIGN KEY `posts_foreign_user_id`".to_string()]
        );
        assert_eq!(sqls(&plan, Phase::CreateForeignKeys).len(), 1);
    }

    #[test]
    fn test_passive_table_with_changes_is_a_conflict() {
        let mut users = Table::from_state(users_state(), "default", Dialect::Sqlite);
        users.set_passive(true);
        assert!(SyncPlan::build(std::slice::from_ref(&users)).unwrap().is_empty());

        users.string("email", 255);
        match SyncPlan::build(&[users]) {
            Err(SyncError::DiffConflict { table, columns, .. }) => {
                assert_eq!(table, "users");
                assert_eq!(columns, vec!["email"]);
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_groups_by_database() {
        let mut a = Table::new("a", "default", Dialect::Sqlite);
        a.primary("id");
        let mut b = Table::new("b", "archive", Dialect::Sqlite);
        b.primary("id");
        let plan = SyncPlan::build(&[a, b]).unwrap();
        assert_eq!(plan.groups.len(), 2);
        assert_eq!(plan.group("archive").unwrap().tables, vec!["b"]);
        assert_eq!(plan.statements().count(), 2);
    }
}
