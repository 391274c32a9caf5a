use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};

use crate::controllers::{AddMushroomController, MyMushroomsController};
use crate::models::{Geolocation, Mushroom};
use crate::repository::MushroomRepository;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct AddCommand {
    /// Name of the mushroom
    #[arg(long)]
    name: String,

    /// What the find looked like, where it grew, and so on
    #[arg(long)]
    description: String,

    /// Path to a photo of the find
    #[arg(long)]
    photo: PathBuf,

    /// Latitude of the find
    #[arg(long)]
    lat: f64,

    /// Longitude of the find
    #[arg(long)]
    lon: f64,

    /// When the mushroom was found (RFC 3339; defaults to now)
    #[arg(long)]
    date: Option<DateTime<Utc>>,
}

impl AddCommand {
    pub async fn run(
        &self,
        repository: Arc<dyn MushroomRepository>,
        user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let image = std::fs::read(&self.photo)?;

        let mut controller = AddMushroomController::new(repository);
        controller.name = self.name.clone();
        controller.description = self.description.clone();
        controller.selected_image = Some(image);
        controller.geolocation = Some(Geolocation::new(self.lat, self.lon));
        if let Some(date) = self.date {
            controller.date_found = date;
        }

        let id = controller.save_mushroom(user_id).await?;
        println!("Saved mushroom '{}' with id {}", self.name, id);
        Ok(())
    }
}

#[derive(Args)]
pub struct ListCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ListCommand {
    pub async fn run(
        &self,
        repository: Arc<dyn MushroomRepository>,
        user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let controller = MyMushroomsController::new(repository);
        let mut mushrooms = controller.mushrooms();
        let mut errors = controller.last_error();

        controller.start(user_id).await;

        // One snapshot is enough for a listing.
        tokio::select! {
            changed = mushrooms.changed() => {
                changed?;
                print_mushrooms(&mushrooms.borrow(), &self.format)?;
            }
            changed = errors.changed() => {
                changed?;
                let error = errors.borrow().clone();
                if let Some(error) = error {
                    return Err(error.into());
                }
            }
        }

        controller.stop();
        Ok(())
    }
}

#[derive(Args)]
pub struct WatchCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl WatchCommand {
    pub async fn run(
        &self,
        repository: Arc<dyn MushroomRepository>,
        user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let controller = MyMushroomsController::new(repository);
        let mut mushrooms = controller.mushrooms();
        let mut errors = controller.last_error();

        controller.start(user_id).await;
        println!("Watching mushrooms for {} (Ctrl-C to stop)", user_id);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = mushrooms.changed() => {
                    changed?;
                    print_mushrooms(&mushrooms.borrow(), &self.format)?;
                }
                changed = errors.changed() => {
                    changed?;
                    if let Some(error) = errors.borrow().as_ref() {
                        eprintln!("Subscription error: {}", error);
                    }
                }
            }
        }

        controller.stop();
        Ok(())
    }
}

fn print_mushrooms(
    mushrooms: &[Mushroom],
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(mushrooms)?);
        }
        OutputFormat::Text => {
            if mushrooms.is_empty() {
                println!("No mushrooms recorded yet.");
                return Ok(());
            }
            for mushroom in mushrooms {
                println!(
                    "{}  {}  ({:.5}, {:.5})",
                    mushroom.date_found.format("%Y-%m-%d"),
                    mushroom.name,
                    mushroom.geolocation.latitude,
                    mushroom.geolocation.longitude
                );
                println!("    {}", mushroom.description);
                println!("    {}", mushroom.photo_url);
            }
        }
    }
    Ok(())
}
