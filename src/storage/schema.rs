//! Database schema definitions

/// SQL to create the nodes table
pub const CREATE_NODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    key TEXT NOT NULL UNIQUE,
    implicit INTEGER NOT NULL
)
"#;

/// SQL to create the edges table
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    source INTEGER NOT NULL REFERENCES nodes(id),
    target INTEGER NOT NULL REFERENCES nodes(id),
    qualifier TEXT NOT NULL,
    UNIQUE(kind, source, target)
)
"#;

/// SQL to create the files table
pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    node INTEGER NOT NULL REFERENCES nodes(id),
    path TEXT NOT NULL UNIQUE,
    language TEXT,
    fingerprint TEXT,
    indexed INTEGER NOT NULL
)
"#;

/// SQL to create the locations table.
/// `element_kind` is one of node, edge, file or location; both element
/// columns are NULL for comments.
pub const CREATE_LOCATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    element_kind TEXT,
    element_id INTEGER,
    owner INTEGER NOT NULL REFERENCES files(id),
    path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    start_column INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    end_column INTEGER NOT NULL
)
"#;

/// SQL to create the diagnostics table
pub const CREATE_DIAGNOSTICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS diagnostics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    file_path TEXT,
    message TEXT NOT NULL,
    fatal INTEGER NOT NULL,
    path TEXT,
    start_line INTEGER,
    start_column INTEGER,
    end_line INTEGER,
    end_column INTEGER
)
"#;

/// SQL to create the meta table
pub const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind)",
    "CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source)",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target)",
    "CREATE INDEX IF NOT EXISTS idx_edges_kind ON edges(kind)",
    "CREATE INDEX IF NOT EXISTS idx_locations_element ON locations(element_kind, element_id)",
    "CREATE INDEX IF NOT EXISTS idx_locations_owner ON locations(owner)",
    "CREATE INDEX IF NOT EXISTS idx_diagnostics_file ON diagnostics(file_path)",
];

/// Tables in the order their rows must be deleted
pub const TABLES_IN_DELETE_ORDER: &[&str] = &["diagnostics", "locations", "edges", "files", "nodes"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_NODES_TABLE,
        CREATE_EDGES_TABLE,
        CREATE_FILES_TABLE,
        CREATE_LOCATIONS_TABLE,
        CREATE_DIAGNOSTICS_TABLE,
        CREATE_META_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
