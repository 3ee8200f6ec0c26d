// src/services/notifier.rs

//! Alert delivery.

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::models::{Listing, format_price};
use crate::services::telegram::{TelegramClient, escape_markdown};
use crate::utils::parse::TOP_FLOOR;

/// Delivers alerts. `send` either delivers the whole message or fails.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, listing: &Listing) -> Result<(), NotifyError>;

    /// Free-form operator message (startup notice).
    async fn send_text(&self, text: &str) -> Result<(), NotifyError>;
}

/// Markdown alert for a listing. Missing values render as `N/A`.
pub fn format_message(listing: &Listing) -> String {
    let address = listing
        .address
        .as_deref()
        .map_or_else(|| "N/A".to_string(), escape_markdown);
    let district = listing
        .district
        .as_deref()
        .map_or_else(|| "N/A".to_string(), escape_markdown);
    let rooms = listing.rooms.map_or_else(|| "N/A".to_string(), format_number);
    let floor = listing.floor.map_or_else(|| "N/A".to_string(), format_floor);
    let area = listing
        .area_sqm
        .map_or_else(|| "N/A".to_string(), |a| format!("{} m²", format_number(a)));

    format!(
        "🏠 *New Flat Found!*\n\n\
         *{title}*\n\
         📍 *Address:* {address}\n\
         🗺️ *District:* {district}\n\
         🛏️ *Rooms:* {rooms}\n\
         🏢 *Floor:* {floor}\n\
         💰 *Price:* {price}/month\n\
         📐 *Area:* {area}\n\n\
         🔗 [View Listing]({url})",
        title = escape_markdown(&listing.title),
        price = format_price(listing.price),
        url = listing.url,
    )
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn format_floor(floor: i32) -> String {
    match floor {
        TOP_FLOOR => "DG".to_string(),
        0 => "EG".to_string(),
        f => f.to_string(),
    }
}

/// Sends alerts to one Telegram chat.
pub struct TelegramNotifier {
    client: TelegramClient,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient, chat_id: impl Into<String>) -> Self {
        Self {
            client,
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, listing: &Listing) -> Result<(), NotifyError> {
        self.client
            .send_message(&self.chat_id, &format_message(listing))
            .await?;
        log::info!("Alert sent for {}", listing.url);
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        self.client.send_message(&self.chat_id, text).await
    }
}

/// Writes alerts to the log instead of delivering them (dry runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, listing: &Listing) -> Result<(), NotifyError> {
        log::info!("[dry-run] alert:\n{}", format_message(listing));
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        log::info!("[dry-run] message:\n{}", text);
        Ok(())
    }
}
