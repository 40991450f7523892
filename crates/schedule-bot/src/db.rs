use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use shared_types::ScheduledEventLink;

use crate::config::DatabaseSettings;
use crate::models::NewScheduledEventLink;

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(settings: &DatabaseSettings) -> anyhow::Result<DbPool> {
    let manager = if settings.tls {
        let mut manager_config = ManagerConfig::default();
        manager_config.custom_setup =
            Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

        AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
            settings.url.clone(),
            manager_config,
        )
    } else {
        AsyncDieselConnectionManager::<AsyncPgConnection>::new(settings.url.clone())
    };

    let pool = Pool::builder(manager)
        .max_size(settings.max_connections.max(1))
        .build()?;

    Ok(pool)
}

// Scheduled event link database operations
pub mod scheduled_event_links {
    use super::*;

    /// Point lookup on the (source, source_id, guild_id) unique key.
    pub async fn exists(
        conn: &mut AsyncPgConnection,
        source_tag: &str,
        item_id: &str,
        guild: i64,
    ) -> QueryResult<bool> {
        use crate::schema::scheduled_event_links::dsl::*;

        let count: i64 = scheduled_event_links
            .filter(source.eq(source_tag))
            .filter(source_id.eq(item_id))
            .filter(guild_id.eq(guild))
            .count()
            .get_result(conn)
            .await?;

        Ok(count > 0)
    }

    /// Insert a link. Returns `None` when the unique key is already taken.
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_link: &NewScheduledEventLink,
    ) -> QueryResult<Option<ScheduledEventLink>> {
        use crate::schema::scheduled_event_links::dsl::*;

        diesel::insert_into(scheduled_event_links)
            .values(new_link)
            .on_conflict((source, source_id, guild_id))
            .do_nothing()
            .get_result::<ScheduledEventLink>(conn)
            .await
            .optional()
    }

    pub async fn list_for_guild(
        conn: &mut AsyncPgConnection,
        guild: i64,
        limit: i64,
    ) -> QueryResult<Vec<ScheduledEventLink>> {
        use crate::schema::scheduled_event_links::dsl::*;

        scheduled_event_links
            .filter(guild_id.eq(guild))
            .order_by(start_utc.desc())
            .limit(limit)
            .load::<ScheduledEventLink>(conn)
            .await
    }

    pub async fn count_all(conn: &mut AsyncPgConnection) -> QueryResult<i64> {
        use crate::schema::scheduled_event_links::dsl::*;

        scheduled_event_links.count().get_result(conn).await
    }
}
