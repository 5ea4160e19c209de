// Diesel schema for HealthArchive's five entities (spec §3).
//
// Timestamps are stored as RFC 3339 text (portable across SQLite and
// Postgres without relying on native timestamp types); opaque blobs
// (`tool_options`, `seeds`, `passthrough_args`) are stored as JSON text
// and (de)serialized in the repository layer.

diesel::table! {
    sources (id) {
        id -> Text,
        code -> Text,
        name -> Text,
        base_url -> Text,
        enabled -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    archive_jobs (id) {
        id -> Text,
        source_id -> Text,
        name -> Text,
        output_dir -> Text,
        status -> Text,
        queued_at -> Text,
        started_at -> Nullable<Text>,
        finished_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
        retry_count -> Integer,
        seeds -> Text,
        tool_options -> Text,
        passthrough_args -> Text,
        crawler_exit_code -> Nullable<Integer>,
        crawler_status -> Nullable<Text>,
        crawler_status_updated_at -> Nullable<Text>,
        crawler_stage -> Nullable<Text>,
        last_stats_json -> Nullable<Text>,
        combined_log_path -> Nullable<Text>,
        state_file_path -> Nullable<Text>,
        warc_file_count -> Integer,
        indexed_page_count -> Integer,
        pages_crawled -> Nullable<Integer>,
        pages_total -> Nullable<Integer>,
        pages_failed -> Nullable<Integer>,
        cleanup_status -> Text,
        cleaned_at -> Nullable<Text>,
    }
}

diesel::table! {
    snapshots (id) {
        id -> Text,
        job_id -> Text,
        source_id -> Text,
        url -> Text,
        normalized_url_group -> Text,
        capture_timestamp -> Text,
        mime_type -> Nullable<Text>,
        status_code -> Nullable<Integer>,
        title -> Nullable<Text>,
        snippet -> Nullable<Text>,
        content_text -> Nullable<Text>,
        language -> Nullable<Text>,
        content_hash -> Text,
        is_archived -> Nullable<Bool>,
        warc_path -> Text,
        warc_record_id -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    snapshot_changes (id) {
        id -> Text,
        from_snapshot_id -> Text,
        to_snapshot_id -> Text,
        normalized_url_group -> Text,
        from_timestamp -> Text,
        to_timestamp -> Text,
        sections_changed -> Integer,
        lines_changed -> Integer,
        diff_artifact -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    page_signals (normalized_url_group) {
        normalized_url_group -> Text,
        inlink_count -> Integer,
        updated_at -> Text,
    }
}

// Materialized "latest snapshot per page group" table, maintained by the
// indexing pipeline, used as the fast path for view=pages empty-query
// searches (spec §4.I).
diesel::table! {
    pages (normalized_url_group) {
        normalized_url_group -> Text,
        latest_snapshot_id -> Text,
        source_id -> Text,
        snapshot_count -> Integer,
        updated_at -> Text,
    }
}

diesel::joinable!(archive_jobs -> sources (source_id));
diesel::joinable!(snapshots -> sources (source_id));
diesel::joinable!(snapshots -> archive_jobs (job_id));
diesel::joinable!(pages -> sources (source_id));

diesel::allow_tables_to_appear_in_same_query!(
    sources,
    archive_jobs,
    snapshots,
    snapshot_changes,
    page_signals,
    pages,
);
