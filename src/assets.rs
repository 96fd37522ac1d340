use rust_embed::RustEmbed;

/// Embedded database migrations
#[derive(RustEmbed)]
#[folder = "migrations/"]
#[prefix = "migrations/"]
pub struct MigrationAssets;

impl MigrationAssets {
    /// Get all migration files in order
    pub fn get_migrations() -> Vec<(String, String)> {
        let mut migrations = Vec::new();

        for file_path in Self::iter() {
            if let Some(file) = Self::get(&file_path) {
                let content = String::from_utf8_lossy(&file.data).to_string();
                let name = file_path
                    .strip_prefix("migrations/")
                    .unwrap_or(&file_path)
                    .to_string();
                migrations.push((name, content));
            }
        }

        migrations.sort_by(|a, b| a.0.cmp(&b.0));
        migrations
    }
}
