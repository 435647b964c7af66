use anyhow::{anyhow, Context, Result};
use attend_api::{ApiClient, ApiConfig, ApiError, Session, SessionStore};
use attend_core::{
    Coordinate, GeofenceValidator, KeyValueStore, LocationCache, LocationError, LocationResolver,
    LocationStatus, ResolverConfig,
};
use attend_platform::{GpsdCapability, GpsdProvider, SqliteStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod photo;

use config::Config;

#[derive(Parser)]
#[command(name = "attend", about = "Face-recognition attendance client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify an employee ID and start a session
    VerifyId {
        /// Employee ID issued by HR
        employee_id: String,
    },
    /// Register a face photo for the signed-in employee
    Register {
        /// Path to the face photo
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Check in with a face photo at the current location
    CheckIn {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Check out with a face photo
    CheckOut {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Show recent attendance records
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Show the current device location
    Locate {
        /// Ignore a recently cached fix and ask the GPS for a new one
        #[arg(long)]
        refresh: bool,
    },
    /// Check the current location against the office geofence
    Validate,
    /// End the session and clear cached location data
    Logout,
    /// Show configuration, session and cache state
    Status,
}

/// Everything a command may need, wired from [`Config`].
struct App {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    sessions: SessionStore,
    resolver: LocationResolver<GpsdProvider, GpsdCapability>,
    validator: GeofenceValidator,
}

impl App {
    async fn open(config: Config) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(
            SqliteStore::open(&config.db_path)
                .await
                .with_context(|| format!("opening state store {}", config.db_path.display()))?,
        );
        let cache = LocationCache::new(store.clone());

        let resolver = LocationResolver::new(
            GpsdProvider::new(config.gpsd_addr.clone()),
            GpsdCapability::new(config.gpsd_addr.clone()),
            cache.clone(),
            ResolverConfig {
                freshness: Duration::from_secs(config.freshness_secs),
                ..ResolverConfig::default()
            },
        );
        let validator = GeofenceValidator::with_ttl(
            cache,
            chrono::Duration::seconds(config.geofence_ttl_secs as i64),
        );

        Ok(Self {
            sessions: SessionStore::new(store.clone()),
            store,
            resolver,
            validator,
            config,
        })
    }

    /// API client carrying the current session's token, if any.
    async fn api(&self) -> Result<ApiClient> {
        let mut api_config = ApiConfig::new(self.config.api_url.clone());
        api_config.timeout = Duration::from_secs(self.config.api_timeout_secs);
        let token = self.sessions.load().await?.and_then(|s| s.token);
        Ok(ApiClient::new(&api_config).map_err(user_error)?.with_token(token))
    }

    async fn require_session(&self) -> Result<Session> {
        self.sessions
            .load()
            .await?
            .ok_or_else(|| anyhow!("No active session. Run `attend verify-id <ID>` first."))
    }

    async fn locate(&self, refresh: bool) -> Result<Coordinate> {
        let result = if refresh {
            self.resolver.refresh_location().await
        } else {
            self.resolver.acquire_location().await
        };
        result.map_err(location_error)
    }

    /// Locate and run the geofence pre-check. An out-of-range result is a
    /// warning only; the backend makes the final decision.
    async fn locate_and_check(&self, api: &ApiClient) -> Result<Coordinate> {
        let coordinate = self.locate(false).await?;
        let result = self
            .validator
            .validate_location_fast(coordinate.latitude, coordinate.longitude, api)
            .await;
        if result.status() == LocationStatus::OutOfRange {
            eprintln!(
                "Warning: you appear to be {} m from the office (allowed {} m).",
                result.distance_meters, result.allowed_radius
            );
        }
        Ok(coordinate)
    }
}

fn user_error(e: ApiError) -> anyhow::Error {
    anyhow!(e.user_message())
}

fn location_error(e: LocationError) -> anyhow::Error {
    anyhow!(e.reason().message())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");
    let app = App::open(config).await?;

    match cli.command {
        Commands::VerifyId { employee_id } => {
            let api = app.api().await?;
            let resp = api
                .verify_employee_id(&employee_id)
                .await
                .map_err(user_error)?;
            app.sessions
                .save(&Session::new(&resp.employee.employee_id, resp.token.clone()))
                .await?;
            app.sessions.save_employee(&resp.employee).await?;
            println!(
                "Verified {} ({})",
                resp.employee.name, resp.employee.employee_id
            );
            if !resp.employee.face_registered {
                println!("No face registered yet. Run `attend register --image <photo>`.");
            }
        }
        Commands::Register { image } => {
            let session = app.require_session().await?;
            let api = app.api().await?;
            let photo = photo::encode_photo(&image)?;
            let coordinate = app.locate_and_check(&api).await?;
            let resp = api
                .register_face(
                    &session.employee_id,
                    &photo,
                    coordinate.latitude,
                    coordinate.longitude,
                )
                .await
                .map_err(user_error)?;
            match resp.confidence {
                Some(c) => println!("Face registered (confidence {c:.2})"),
                None => println!("Face registered"),
            }
        }
        Commands::CheckIn { image } => {
            app.require_session().await?;
            let api = app.api().await?;
            let photo = photo::encode_photo(&image)?;
            let coordinate = app.locate_and_check(&api).await?;
            let resp = api
                .check_in(&photo, coordinate.latitude, coordinate.longitude)
                .await
                .map_err(user_error)?;
            println!("{}", non_empty(&resp.message, "Checked in"));
        }
        Commands::CheckOut { image } => {
            app.require_session().await?;
            let api = app.api().await?;
            let photo = photo::encode_photo(&image)?;
            let resp = api.check_out(&photo).await.map_err(user_error)?;
            println!("{}", non_empty(&resp.message, "Checked out"));
        }
        Commands::History { limit } => {
            let session = app.require_session().await?;
            let api = app.api().await?;
            let resp = api
                .attendance_history(&session.employee_id, limit)
                .await
                .map_err(user_error)?;
            if resp.history.is_empty() {
                println!("No attendance records");
            }
            for record in resp.history {
                println!(
                    "{:<12} {:<10} in {:<8} out {:<8}",
                    record.date,
                    record.status,
                    record.check_in_time.as_deref().unwrap_or("-"),
                    record.check_out_time.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Locate { refresh } => {
            let c = app.locate(refresh).await?;
            println!("{:.6}, {:.6}", c.latitude, c.longitude);
            if let Some(accuracy) = c.accuracy {
                println!("accuracy: ±{accuracy:.0} m");
            }
            println!("captured: {}", c.captured_at.to_rfc3339());
        }
        Commands::Validate => {
            let api = app.api().await?;
            let c = app.locate(false).await?;
            let result = app
                .validator
                .validate_location_fast(c.latitude, c.longitude, &api)
                .await;
            println!("{}", result.status().label());
            if result.is_configured {
                println!(
                    "distance: {} m (allowed {} m){}",
                    result.distance_meters,
                    result.allowed_radius,
                    if result.from_cache { " [cached geofence]" } else { "" }
                );
            }
        }
        Commands::Logout => {
            app.sessions.logout().await?;
            println!("Logged out");
        }
        Commands::Status => {
            let session = app.sessions.load().await?;
            let cache = LocationCache::new(app.store.clone());
            let coordinate = cache.load_coordinate().await;
            let geofence = cache.load_geofence(chrono::Utc::now()).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "api_url": app.config.api_url,
                    "db_path": app.config.db_path,
                    "gpsd": app.config.gpsd_addr,
                    "employee_id": session.map(|s| s.employee_id),
                    "last_known_location": coordinate,
                    "geofence": geofence,
                }))?
            );
        }
    }

    Ok(())
}

fn non_empty<'a>(message: &'a str, fallback: &'a str) -> &'a str {
    if message.trim().is_empty() {
        fallback
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check_in() {
        let cli = Cli::try_parse_from(["attend", "check-in", "--image", "me.jpg"]).unwrap();
        match cli.command {
            Commands::CheckIn { image } => assert_eq!(image, PathBuf::from("me.jpg")),
            _ => panic!("expected check-in"),
        }
    }

    #[test]
    fn test_history_default_limit() {
        let cli = Cli::try_parse_from(["attend", "history"]).unwrap();
        assert!(matches!(cli.command, Commands::History { limit: 10 }));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  ", "Checked in"), "Checked in");
        assert_eq!(non_empty("Welcome", "Checked in"), "Welcome");
    }
}
