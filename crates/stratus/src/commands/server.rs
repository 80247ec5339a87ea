use crate::ServerCommands;
use crate::context;
use colored::Colorize;
use stratus_cloud::ResourceProvider;
use stratus_cloud_sakura::{PowerState, ServerInfo, ServerSpec};
use stratus_config::Settings;

pub async fn handle(settings: &Settings, command: ServerCommands) -> anyhow::Result<()> {
    match command {
        ServerCommands::Create {
            name,
            plan,
            disk_size,
            os_type,
            ssh_key_ids,
            tags,
            stopped,
            zone,
        } => {
            let provider = context::sakura(settings, &zone)?;
            let spec = ServerSpec {
                name,
                plan,
                disk_size,
                os_type,
                ssh_key_ids,
                tags,
                power: if stopped { PowerState::Down } else { PowerState::Up },
            };

            println!(
                "{}",
                format!(
                    "Creating server '{}' in {} (timeout {}s)...",
                    spec.name,
                    provider.zone(),
                    provider.timeouts().create.as_secs()
                )
                .yellow()
            );
            let server = provider.create(&spec).await?;
            println!("{}", format!("✓ Server '{}' is ready", server.name).green().bold());
            print_server(&server);
        }
        ServerCommands::Delete { id, zone } => {
            let provider = context::sakura(settings, &zone)?;
            println!(
                "{}",
                format!("Deleting server {} in {}...", id, provider.zone()).yellow()
            );
            provider.delete(&id).await?;
            println!("{}", format!("✓ Server {} deleted", id).green().bold());
        }
        ServerCommands::PowerOn { id, zone } => {
            let provider = context::sakura(settings, &zone)?;
            println!("{}", format!("Powering on server {}...", id).yellow());
            let server = provider.set_power(&id, PowerState::Up).await?;
            println!("{}", format!("✓ Server '{}' is up", server.name).green().bold());
        }
        ServerCommands::PowerOff { id, zone } => {
            let provider = context::sakura(settings, &zone)?;
            println!("{}", format!("Shutting down server {}...", id).yellow());
            let server = provider.set_power(&id, PowerState::Down).await?;
            println!("{}", format!("✓ Server '{}' is down", server.name).green().bold());
        }
        ServerCommands::Show { id, zone } => {
            let provider = context::sakura(settings, &zone)?;
            match provider.read(&id).await? {
                Some(server) => print_server(&server),
                None => println!("{}", format!("ℹ Server {} does not exist", id).dimmed()),
            }
        }
    }

    Ok(())
}

fn print_server(server: &ServerInfo) {
    let status = server.instance_status();
    let status = if server.is_running() {
        status.green()
    } else {
        status.yellow()
    };
    println!("  {:<14} {}", "ID:".dimmed(), server.id_str().cyan());
    println!("  {:<14} {}", "Name:".dimmed(), server.name);
    println!("  {:<14} {}", "Status:".dimmed(), status);
    println!("  {:<14} {}", "Availability:".dimmed(), server.availability());
    if let Some(ip) = server.ip_address() {
        println!("  {:<14} {}", "IP:".dimmed(), ip);
    }
    if let (Some(cpu), Some(memory)) = (server.cpu, server.memory_mb) {
        println!("  {:<14} {} core / {} MB", "Plan:".dimmed(), cpu, memory);
    }
    if !server.tags.is_empty() {
        println!("  {:<14} {}", "Tags:".dimmed(), server.tags.join(", "));
    }
}
