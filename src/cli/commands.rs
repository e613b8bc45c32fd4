//! Command dispatch: settings, container wiring and output

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::application::services::{
    ElementDraft, ElementFilter, ElementPatch, NewElement, NewProduct, ProductPatch,
};
use crate::cli::args::{
    Cli, Commands, ConfigCommands, ContactArgs, DebtCommands, ElementCommands, ProductCommands,
};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{expand_env_vars, Contact, ElementId, ProductId};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see `salesnet --help`".into(),
        ));
    };

    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => cmd_config(cli, command),
        Commands::Product { command } => cmd_product(&build_container(cli)?, command),
        Commands::Element { command } => cmd_element(&build_container(cli)?, command),
        Commands::Tree => cmd_tree(&build_container(cli)?),
        Commands::Debt {
            command: DebtCommands::Clear { ids },
        } => cmd_debt_clear(&build_container(cli)?, ids),
        Commands::Check { fix } => cmd_check(&build_container(cli)?, *fix),
    }
}

/// Directory searched for `.salesnet.toml`.
fn config_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.config_dir {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir()
            .map_err(|e| InfraError::io("determine current directory", e).into()),
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let dir = config_dir(cli)?;
    let mut settings = Settings::load(Some(&dir))?;
    if let Some(data_file) = &cli.data_file {
        settings.data_file = PathBuf::from(expand_env_vars(&data_file.to_string_lossy()));
    }
    debug!(data_file = %settings.data_file.display(), policy = %settings.hierarchy.level_policy, "settings loaded");
    Ok(settings)
}

fn build_container(cli: &Cli) -> CliResult<ServiceContainer> {
    Ok(ServiceContainer::new(load_settings(cli)?))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| InfraError::json("output", e).into())
}

// ============================================================
// config
// ============================================================

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            output::header("Config files");
            match global_config_path() {
                Some(path) => print_config_location("global", &path),
                None => output::failure("global: no home directory"),
            }
            print_config_location("local", &local_config_path(&config_dir(cli)?));
        }
        ConfigCommands::Template => output::info(&Settings::template()),
    }
    Ok(())
}

fn print_config_location(label: &str, path: &Path) {
    let line = format!("{label}: {}", path.display());
    if path.exists() {
        output::success_detail(&line);
    } else {
        output::failure(&format!("{line} (not found)"));
    }
}

// ============================================================
// product
// ============================================================

#[instrument(skip(container))]
fn cmd_product(container: &ServiceContainer, command: &ProductCommands) -> CliResult<()> {
    let service = container.product_service();
    match command {
        ProductCommands::Add {
            name,
            model,
            release_date,
        } => {
            let product = service.create_product(NewProduct {
                name: name.clone(),
                model: model.clone(),
                release_date: *release_date,
            })?;
            output::action("Created", &product);
        }
        ProductCommands::List { json } => {
            let products = service.list_products()?;
            if *json {
                output::info(&to_json(&products)?);
            } else if products.is_empty() {
                output::info("no products");
            } else {
                output::header("Products");
                for product in &products {
                    output::detail(product);
                }
            }
        }
        ProductCommands::Show { id } => {
            let product = service.get_product(ProductId(*id))?;
            output::info(&to_json(&product)?);
        }
        ProductCommands::Update {
            id,
            name,
            model,
            clear_model,
            release_date,
            clear_release_date,
        } => {
            let patch = ProductPatch {
                name: name.clone(),
                model: if *clear_model {
                    Some(None)
                } else {
                    model.clone().map(Some)
                },
                release_date: if *clear_release_date {
                    Some(None)
                } else {
                    release_date.map(Some)
                },
            };
            let product = service.update_product(ProductId(*id), patch)?;
            output::action("Updated", &product);
        }
        ProductCommands::Remove { id } => {
            let detached = service.delete_product(ProductId(*id))?;
            output::action("Removed", &ProductId(*id));
            if detached > 0 {
                output::detail(&format!("detached from {detached} element(s)"));
            }
        }
    }
    Ok(())
}

// ============================================================
// element
// ============================================================

fn contact_from_args(args: &ContactArgs) -> Contact {
    Contact {
        name: args.name.clone().unwrap_or_default(),
        email: args.email.clone().unwrap_or_default(),
        country: args.country.clone().unwrap_or_default(),
        city: args.city.clone().unwrap_or_default(),
        street: args.street.clone().unwrap_or_default(),
        building: args.building.clone().unwrap_or_default(),
    }
}

fn product_ids(ids: &[u64]) -> BTreeSet<ProductId> {
    ids.iter().copied().map(ProductId).collect()
}

#[instrument(skip(container))]
fn cmd_element(container: &ServiceContainer, command: &ElementCommands) -> CliResult<()> {
    let service = container.network_service();
    match command {
        ElementCommands::Add {
            contact,
            parent,
            products,
            debt,
        } => {
            let element = service.create_element(NewElement {
                contact: contact_from_args(contact),
                parent: parent.map(ElementId),
                products: product_ids(products),
                debt_to_parent: *debt,
                network_lvl: None,
            })?;
            output::action("Created", &element);
        }
        ElementCommands::Update {
            id,
            contact,
            parent,
            detach,
            products,
            no_products,
            debt,
        } => {
            if debt.is_some() {
                output::warning(
                    "debt_to_parent cannot be changed by update, ignoring --debt (see `salesnet debt clear`)",
                );
            }
            let patch = ElementPatch {
                name: contact.name.clone(),
                email: contact.email.clone(),
                country: contact.country.clone(),
                city: contact.city.clone(),
                street: contact.street.clone(),
                building: contact.building.clone(),
                parent: if *detach {
                    Some(None)
                } else {
                    parent.map(|p| Some(ElementId(p)))
                },
                products: if *no_products {
                    Some(BTreeSet::new())
                } else if products.is_empty() {
                    None
                } else {
                    Some(product_ids(products))
                },
                debt_to_parent: *debt,
                network_lvl: None,
            };
            let element = service.update_element(ElementId(*id), patch)?;
            output::action("Updated", &element);
        }
        ElementCommands::Show { id } => {
            let element = service.get_element(ElementId(*id))?;
            output::info(&to_json(&element)?);
        }
        ElementCommands::List { country, json } => {
            let filter = ElementFilter {
                country: country.clone(),
            };
            let elements = service.list_elements(&filter)?;
            if *json {
                output::info(&to_json(&elements)?);
            } else if elements.is_empty() {
                output::info("no elements");
            } else {
                output::header("Elements");
                for element in &elements {
                    output::detail(&format!(
                        "{:<6} {:<16} {:<24} lvl {:<3} debt {}",
                        element.id.to_string(),
                        element.contact.city,
                        element.name(),
                        element.network_lvl,
                        element.debt_to_parent
                    ));
                }
            }
        }
        ElementCommands::Remove { id } => {
            let removed = service.delete_element(ElementId(*id))?;
            output::action("Removed", &format!("{} element(s)", removed.len()));
            for id in &removed {
                output::removed(id);
            }
        }
        ElementCommands::Import { file } => {
            let drafts = read_drafts(container, file)?;
            let created = service.import_elements(drafts)?;
            output::action("Imported", &format!("{} element(s)", created.len()));
            for element in &created {
                output::success_detail(element);
            }
        }
    }
    Ok(())
}

fn read_drafts(container: &ServiceContainer, file: &Path) -> CliResult<Vec<ElementDraft>> {
    let content = container
        .fs
        .read_to_string(file)
        .map_err(|e| InfraError::io(format!("read {}", file.display()), e))?;
    let drafts = serde_json::from_str(&content)
        .map_err(|e| InfraError::json(file.display().to_string(), e))?;
    Ok(drafts)
}

// ============================================================
// tree / debt / check
// ============================================================

fn cmd_tree(container: &ServiceContainer) -> CliResult<()> {
    let trees = container.network_service().tree()?;
    if trees.is_empty() {
        output::info("network is empty");
    }
    for tree in &trees {
        output::info(tree);
    }
    Ok(())
}

fn cmd_debt_clear(container: &ServiceContainer, ids: &[u64]) -> CliResult<()> {
    let ids: BTreeSet<ElementId> = ids.iter().copied().map(ElementId).collect();
    let cleared = container.network_service().bulk_clear_debt(&ids)?;
    output::action(
        "Cleared debt",
        &format!("{cleared} of {} element(s)", ids.len()),
    );
    Ok(())
}

fn cmd_check(container: &ServiceContainer, fix: bool) -> CliResult<()> {
    let service = container.network_service();
    let report = service.check(fix)?;
    if report.drift.is_empty() {
        output::success(&format!(
            "{} element(s) checked, levels consistent",
            report.checked
        ));
        return Ok(());
    }

    output::header("Level drift");
    for drift in &report.drift {
        output::failure(&format!(
            "{}: stored {}, expected {}",
            drift.id, drift.stored, drift.expected
        ));
    }
    if report.fixed > 0 {
        output::success(&format!("fixed {} element(s)", report.fixed));
    } else {
        output::warning(&format!(
            "run `salesnet check --fix` to repair (level policy: {})",
            service.policy()
        ));
    }
    Ok(())
}
