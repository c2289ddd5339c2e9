use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};

use crate::models::{COMMENTS, CURRENCIES, FAVORITES, RECIPES, TOKENS, USERS};
use crate::utils::AppError;

const DUPLICATE_KEY: i32 = 11000;

/// True when a write failed on a unique index.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, AppError> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        // Database name comes from the URI path
        let db_name = uri
            .rsplit('/')
            .next()
            .and_then(|s| s.split('?').next())
            .filter(|s| !s.is_empty() && !s.contains(':') && !s.contains('@'))
            .unwrap_or("recipes");

        let db = client.database(db_name);

        db.list_collection_names().await?;

        let mongodb = Self { db };
        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    async fn ensure_indexes(&self) -> Result<(), AppError> {
        log::info!("🔧 Creating database indexes...");

        self.create_index(USERS, doc! { "email": 1 }, true).await;
        self.create_index(TOKENS, doc! { "user_id": 1 }, true).await;
        self.create_index(FAVORITES, doc! { "user_id": 1, "recipe_id": 1 }, true).await;
        self.create_index(FAVORITES, doc! { "recipe_id": 1 }, false).await;
        self.create_index(COMMENTS, doc! { "recipe_id": 1, "parent_id": 1 }, false).await;
        self.create_index(COMMENTS, doc! { "author_id": 1 }, false).await;
        self.create_index(RECIPES, doc! { "owner_id": 1 }, false).await;
        self.create_index(RECIPES, doc! { "is_public": 1, "created_at": -1 }, false).await;
        self.create_index(CURRENCIES, doc! { "code": 1 }, true).await;

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    async fn create_index(&self, collection: &str, keys: Document, unique: bool) {
        let label = format!(
            "{}({})",
            collection,
            keys.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        let model = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(unique).build())
            .build();

        match self.collection::<Document>(collection).create_index(model).await {
            Ok(_) => log::info!("   ✅ Index created: {}", label),
            Err(e) => log::debug!("   ℹ️  Index already exists: {} ({})", label, e),
        }
    }

    /// Round-trip to the server, used by `/health`.
    pub async fn ping(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}
