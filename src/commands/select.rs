//! Select command - show prayer times for a city.

use anyhow::Result;
use colored::Colorize;
use tabled::{
    settings::{object::Columns, style::Style, Alignment, Modify},
    Table, Tabled,
};

use super::OutputFormat;
use crate::api::{CityBundle, Prayer, Venue};
use crate::sync::{SelectStatus, Selection, SyncManager, WaitPhase};

/// Table row for one venue.
#[derive(Tabled)]
struct VenueRow {
    #[tabled(rename = "")]
    indicator: String,
    #[tabled(rename = "Mosque")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Fajr")]
    fajr: String,
    #[tabled(rename = "Dhuhr")]
    dhuhr: String,
    #[tabled(rename = "Asr")]
    asr: String,
    #[tabled(rename = "Maghrib")]
    maghrib: String,
    #[tabled(rename = "Isha")]
    isha: String,
}

/// Execute the select command.
///
/// With `wait`, a pending selection blocks until the background scrape
/// settles and the refreshed data (if any) is printed as well. Ctrl-C stops
/// the wait.
pub async fn execute(
    manager: &SyncManager,
    city: &str,
    wait: bool,
    format: OutputFormat,
) -> Result<()> {
    let selection = manager.select_city(city).await;
    report(manager, selection, wait, format).await
}

/// Execute the refresh command: drop every cached city and reload the
/// current one.
pub async fn execute_refresh(manager: &SyncManager, format: OutputFormat) -> Result<()> {
    match manager.refresh_after_scrape().await {
        Some(selection) => print_selection(&selection, format),
        None => {
            println!("{} No city selected yet", "✗".red().bold());
            Ok(())
        }
    }
}

/// Execute the restore command.
pub async fn execute_restore(manager: &SyncManager, wait: bool, format: OutputFormat) -> Result<()> {
    match manager.restore_last_selection().await {
        Some(selection) => report(manager, selection, wait, format).await,
        None => {
            println!("{} No city selected yet", "✗".red().bold());
            Ok(())
        }
    }
}

async fn report(
    manager: &SyncManager,
    selection: Selection,
    wait: bool,
    format: OutputFormat,
) -> Result<()> {
    let pending = selection.status == SelectStatus::Pending;
    print_selection(&selection, format)?;

    if !(wait && pending) {
        return Ok(());
    }

    if matches!(format, OutputFormat::Human) {
        println!("{}", "Waiting for the update to finish…".dimmed());
    }
    tokio::select! {
        _ = manager.settle() => {}
        _ = tokio::signal::ctrl_c() => {
            manager.cancel_wait();
            eprintln!("{} Stopped waiting for the update", "!".yellow().bold());
            return Ok(());
        }
    }

    match (manager.wait_phase(), manager.cached_city(&selection.city)) {
        (WaitPhase::Resolved, Some(bundle)) => {
            let refreshed = Selection {
                city: selection.city,
                status: SelectStatus::Fresh,
                bundle: Some(bundle),
            };
            print_selection(&refreshed, format)?;
        }
        (WaitPhase::TimedOut, _) => {
            eprintln!(
                "{} The update is taking longer than expected; try again later",
                "!".yellow().bold()
            );
        }
        (phase, _) => {
            tracing::debug!("Wait settled in {:?} without new data", phase);
        }
    }

    Ok(())
}

fn print_selection(selection: &Selection, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            print_human(selection);
            Ok(())
        }
        OutputFormat::Json => print_json(selection),
    }
}

fn print_human(selection: &Selection) {
    let Some(bundle) = &selection.bundle else {
        println!(
            "{} No data available for '{}'",
            "✗".red().bold(),
            selection.city.cyan()
        );
        return;
    };

    let status = match selection.status {
        SelectStatus::Cached => "cached".dimmed(),
        SelectStatus::Fresh => "fresh".green(),
        SelectStatus::Pending => "updating".yellow(),
        SelectStatus::Incomplete => "incomplete".yellow(),
        SelectStatus::Unavailable => "unavailable".red(),
    };
    println!("{} {} ({})", bundle.city.bold(), bundle.date, status);

    if bundle.venues.is_empty() {
        println!("No mosques listed for this city");
        return;
    }

    let rows: Vec<VenueRow> = bundle.venues.iter().map(venue_row).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..=7)).with(Alignment::right()))
        .to_string();
    println!("{}", table);

    print_footer(bundle);
}

fn venue_row(venue: &Venue) -> VenueRow {
    let indicator = match &venue.times {
        Some(times) if times.is_valid() => "■".green().to_string(),
        Some(_) => "■".yellow().to_string(),
        None => " ".to_string(),
    };
    let time = |prayer: Prayer| {
        venue
            .times
            .as_ref()
            .and_then(|t| t.prayer(prayer))
            .map(short_time)
            .unwrap_or_else(|| "—".to_string())
    };

    let [fajr, dhuhr, asr, maghrib, isha] = Prayer::FIVE.map(time);

    VenueRow {
        indicator,
        name: truncate(&venue.name, 32),
        address: truncate(&venue.address, 32),
        fajr,
        dhuhr,
        asr,
        maghrib,
        isha,
    }
}

fn print_footer(bundle: &CityBundle) {
    println!(
        "{} of {} mosques with times  {} Times  {} Not yet published",
        bundle.venues_with_times(),
        bundle.venues.len(),
        "■".green(),
        "■".yellow()
    );
}

fn print_json(selection: &Selection) -> Result<()> {
    let json = serde_json::to_string_pretty(selection)?;
    println!("{}", json);
    Ok(())
}

/// `05:12:00` → `05:12`; anything else is shown as-is.
fn short_time(time: &str) -> String {
    match time.split(':').collect::<Vec<_>>().as_slice() {
        [h, m, s] if s.chars().all(|c| c.is_ascii_digit()) => format!("{}:{}", h, m),
        _ => time.to_string(),
    }
}

/// Truncate a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{TimeRecord, VenueId};

    fn venue(times: Option<TimeRecord>) -> Venue {
        Venue {
            id: VenueId::new("1"),
            name: "Green Lane Masjid".into(),
            address: "20 Green Lane".into(),
            coordinates: None,
            times,
        }
    }

    #[test]
    fn test_short_time() {
        assert_eq!(short_time("05:12:00"), "05:12");
        assert_eq!(short_time("5:12"), "5:12");
        assert_eq!(short_time("5:12 PM"), "5:12 PM");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("Masjid", 10), "Masjid");
        assert_eq!(truncate("Jāmiʿ Masjid Birmingham", 6), "Jāmiʿ…");
    }

    #[test]
    fn test_placeholders_render_as_dash() {
        let times = TimeRecord::new()
            .with("fajr", Some("00:00:00"))
            .with("dhuhr", Some("13:05:00"))
            .with("asr", None);
        let row = venue_row(&venue(Some(times)));
        assert_eq!(row.fajr, "—");
        assert_eq!(row.dhuhr, "13:05");
        assert_eq!(row.asr, "—");
        assert_eq!(row.isha, "—");

        let row = venue_row(&venue(None));
        assert_eq!(row.maghrib, "—");
        assert_eq!(row.indicator, " ");
    }
}
