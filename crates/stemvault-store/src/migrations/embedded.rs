/// One schema step, identified by its file stem
pub(crate) struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "001_revision_ledger",
        sql: include_str!("../../migrations/001_revision_ledger.sql"),
    },
    Migration {
        id: "002_repository_meta",
        sql: include_str!("../../migrations/002_repository_meta.sql"),
    },
];
