//! SQLite schema definition

/// SQL schema for the URL store
pub const SCHEMA_SQL: &str = r#"
-- URLs: every candidate web address known to the system
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending',
    source TEXT NOT NULL DEFAULT 'collector',
    name TEXT,
    description TEXT,
    record_type TEXT,
    collector_metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Tasks: one row per operator invocation
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_type TEXT NOT NULL,
    task_status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Task to URL links: which URLs a task touched
CREATE TABLE IF NOT EXISTS link_task_urls (
    task_id INTEGER NOT NULL REFERENCES tasks(id),
    url_id INTEGER NOT NULL REFERENCES urls(id),
    PRIMARY KEY (task_id, url_id)
);

-- Task errors: failure text for errored tasks
CREATE TABLE IF NOT EXISTS task_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id),
    error TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Per-URL failures recorded by a task run
CREATE TABLE IF NOT EXISTS url_error_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id),
    url_id INTEGER NOT NULL REFERENCES urls(id),
    error TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Web metadata: latest probe outcome, one row per URL
CREATE TABLE IF NOT EXISTS url_web_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL UNIQUE REFERENCES urls(id),
    accessed INTEGER NOT NULL,
    status_code INTEGER,
    content_type TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (error_message IS NULL OR content_type IS NULL)
);

-- Redirect links: source URL resolved to destination URL
CREATE TABLE IF NOT EXISTS url_redirect_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_url_id INTEGER NOT NULL REFERENCES urls(id),
    destination_url_id INTEGER NOT NULL REFERENCES urls(id),
    created_at TEXT NOT NULL
);

-- HTML fetch attempts
CREATE TABLE IF NOT EXISTS url_scrape_info (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Parsed HTML fields (title, description, h1..h6, div)
CREATE TABLE IF NOT EXISTS url_html_content (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    content_type TEXT NOT NULL,
    content TEXT NOT NULL,
    UNIQUE(url_id, content_type)
);

CREATE TABLE IF NOT EXISTS url_checked_for_duplicates (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS url_probed_for_404 (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    last_probed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS auto_record_type_suggestions (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    record_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS auto_relevant_suggestions (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    is_relevant INTEGER NOT NULL,
    confidence REAL,
    model_name TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS url_optional_metadata (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    record_formats TEXT,
    data_portal_type TEXT,
    supplying_entity TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agencies (
    agency_id INTEGER PRIMARY KEY,
    name TEXT,
    state TEXT,
    county TEXT,
    locality TEXT,
    updated_at TEXT NOT NULL
);

-- Automated agency guesses; agency_id is NULL when the agency is unknown
CREATE TABLE IF NOT EXISTS automated_url_agency_suggestions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    agency_id INTEGER REFERENCES agencies(agency_id),
    is_unknown INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(url_id, agency_id)
);

-- Confirmed URL to agency links
CREATE TABLE IF NOT EXISTS link_urls_agencies (
    url_id INTEGER NOT NULL REFERENCES urls(id),
    agency_id INTEGER NOT NULL REFERENCES agencies(agency_id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (url_id, agency_id)
);

CREATE TABLE IF NOT EXISTS url_data_sources (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    data_source_id INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS flag_root_urls (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS link_urls_root_url (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    root_url_id INTEGER NOT NULL REFERENCES urls(id),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS backlog_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    count_pending_total INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Indexes for common queries
CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status);
CREATE INDEX IF NOT EXISTS idx_tasks_type_status ON tasks(task_type, task_status);
CREATE INDEX IF NOT EXISTS idx_link_task_urls_url ON link_task_urls(url_id);
CREATE INDEX IF NOT EXISTS idx_task_errors_task ON task_errors(task_id);
CREATE INDEX IF NOT EXISTS idx_url_error_info_url ON url_error_info(url_id);
CREATE INDEX IF NOT EXISTS idx_redirect_links_source ON url_redirect_links(source_url_id);
CREATE INDEX IF NOT EXISTS idx_html_content_url ON url_html_content(url_id);
CREATE INDEX IF NOT EXISTS idx_agency_suggestions_url ON automated_url_agency_suggestions(url_id);
"#;
