diesel::table! {
    scheduled_event_links (id) {
        id -> Uuid,
        #[max_length = 32]
        source -> Varchar,
        #[max_length = 256]
        source_id -> Varchar,
        guild_id -> Int8,
        discord_event_id -> Int8,
        start_utc -> Timestamptz,
        end_utc -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
