use crate::DnsCommands;
use crate::context;
use colored::Colorize;
use stratus_cloud_cloudflare::{DnsRecordInfo, DnsRecordSpec};
use stratus_config::Settings;

pub async fn handle(settings: &Settings, command: DnsCommands) -> anyhow::Result<()> {
    let dns = context::cloudflare(settings)?;

    match command {
        DnsCommands::Ensure {
            name,
            content,
            record_type,
            ttl,
            proxied,
        } => {
            let spec = DnsRecordSpec {
                name,
                record_type,
                content,
                ttl,
                proxied,
            };
            println!("{}", format!("Ensuring DNS record {} -> {}...", spec.name, spec.content).yellow());
            let record = dns.ensure(&spec).await?;
            println!("{}", format!("✓ {} -> {}", record.name, record.content).green().bold());
        }
        DnsCommands::Remove { name, record_type } => {
            dns.remove(&name, &record_type).await?;
            println!("{}", format!("✓ DNS record {} removed", name).green().bold());
        }
        DnsCommands::Show { name, record_type } => match dns.find_record(&name, &record_type).await? {
            Some(record) => print_record(&record),
            None => println!("{}", format!("ℹ DNS record {} does not exist", name).dimmed()),
        },
    }

    Ok(())
}

fn print_record(record: &DnsRecordInfo) {
    println!("  {:<9} {}", "ID:".dimmed(), record.id.cyan());
    println!("  {:<9} {}", "Name:".dimmed(), record.name);
    println!("  {:<9} {}", "Type:".dimmed(), record.record_type);
    println!("  {:<9} {}", "Content:".dimmed(), record.content);
    let ttl = match record.ttl {
        Some(1) | None => "auto".to_string(),
        Some(ttl) => ttl.to_string(),
    };
    println!("  {:<9} {}", "TTL:".dimmed(), ttl);
    println!("  {:<9} {}", "Proxied:".dimmed(), record.proxied);
}
