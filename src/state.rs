use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::cache::{CodeCache, InMemoryCache, RedisCache};
use crate::config::AppConfig;
use crate::mail::{InMemoryMailer, Mailer, SmtpMailer};
use crate::users::repo::{InMemoryUserRepository, PgUserRepository, UserRepository};
use crate::users::services::UserService;

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connects every configured backend. Anything left unconfigured runs in memory.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let repo: Arc<dyn UserRepository> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run database migrations")?;
                info!("using postgres user repository");
                Arc::new(PgUserRepository::new(db))
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory");
                Arc::new(InMemoryUserRepository::new())
            }
        };

        let cache: Arc<dyn CodeCache> = match &config.redis_url {
            Some(url) => {
                let cache = RedisCache::connect(url)
                    .await
                    .context("connect to redis")?;
                info!("using redis code cache");
                Arc::new(cache)
            }
            None => {
                warn!("REDIS_URL not set; verification codes are kept in memory");
                Arc::new(InMemoryCache::new())
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => {
                let mailer = SmtpMailer::new(smtp).context("configure smtp transport")?;
                info!(host = %smtp.host, port = smtp.port, "using smtp mailer");
                Arc::new(mailer)
            }
            None => {
                warn!("SMTP_HOST not set; verification codes are not delivered");
                Arc::new(InMemoryMailer::new())
            }
        };

        Ok(Self::from_parts(Arc::new(config), repo, cache, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        repo: Arc<dyn UserRepository>,
        cache: Arc<dyn CodeCache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            users: UserService::new(repo, cache, mailer),
            config,
        }
    }
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}
