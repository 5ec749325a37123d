use clap::Subcommand;
use restwatch_core::{Ledger, Period};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's compliance report
    Today,
    /// Compliance over the last 7 days
    Week,
    /// Compliance over the last month
    Month,
    /// List today's breaks
    Breaks,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Ledger::open()?;

    match action {
        StatsAction::Today => print_report(&ledger, Period::Today)?,
        StatsAction::Week => print_report(&ledger, Period::Week)?,
        StatsAction::Month => print_report(&ledger, Period::Month)?,
        StatsAction::Breaks => {
            let breaks = ledger.breaks_for_date(chrono::Utc::now().date_naive())?;
            println!("{}", serde_json::to_string_pretty(&breaks)?);
        }
    }
    Ok(())
}

fn print_report(ledger: &Ledger, period: Period) -> Result<(), Box<dyn std::error::Error>> {
    let report = ledger.compliance_report(period)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
