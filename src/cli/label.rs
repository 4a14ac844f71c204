use std::{path::PathBuf, sync::Arc};

use ansi_term::Colour;
use anyhow::{bail, Result};
use clap::Subcommand;

use crate::{
    engine::serial,
    labels::{registry::LabelRegistry, store::JsonLabelStore, Label},
};

#[derive(Debug, Subcommand)]
pub enum LabelCommand {
    #[command(about = "List every label known to the daemon")]
    List,
    #[command(about = "Create a new label")]
    Add {
        name: String,
        #[arg(long, help = "Apply the label to every observation while active")]
        manual: bool,
        #[arg(
            long,
            help = "Condition tree as JSON, e.g. '{\"operator\":\"and\",\"conditions\":[{\"attribute_name\":\"window_type\",\"comp_operator\":\"==\",\"attribute_value\":\"code.exe\"}]}'"
        )]
        conditions: Option<String>,
        #[arg(long, help = "Create the label disabled")]
        inactive: bool,
    },
    #[command(about = "Start applying an existing label")]
    Enable { name: String },
    #[command(about = "Stop applying a label without removing it")]
    Disable { name: String },
    #[command(about = "Remove a label. Labels still referenced by records are kept hidden instead")]
    Remove { name: String },
}

pub fn process_label_command(command: LabelCommand, dir: PathBuf) -> Result<()> {
    let store = JsonLabelStore::new(dir.join("labels.json"), Some(dir.join("records")))?;
    let registry = LabelRegistry::load_from_store(&store)?;

    match command {
        LabelCommand::List => {
            for label in registry.all() {
                println!("{}", describe(&label));
            }
            Ok(())
        }
        LabelCommand::Add {
            name,
            manual,
            conditions,
            inactive,
        } => {
            if registry.find(&name).is_some() {
                bail!("a label named `{name}` already exists");
            }
            let conditions = conditions
                .as_deref()
                .map(serial::group_from_json)
                .transpose()?;
            if !manual && conditions.is_none() {
                bail!("a label needs either --manual or --conditions to ever apply");
            }
            let label = Label::new(&name, manual, !inactive, conditions, &store)?;
            println!("Added {}", describe(&label));
            Ok(())
        }
        LabelCommand::Enable { name } => {
            let label = find_or_bail(&registry, &name)?;
            label.enable();
            label.update_in_store(&store)?;
            println!("Enabled {}", Colour::Green.paint(label.name()));
            Ok(())
        }
        LabelCommand::Disable { name } => {
            let label = find_or_bail(&registry, &name)?;
            label.disable();
            label.update_in_store(&store)?;
            println!("Disabled {}", Colour::Yellow.paint(label.name()));
            Ok(())
        }
        LabelCommand::Remove { name } => {
            let Some(label) = registry.unregister(&name) else {
                bail!("no label named `{name}`");
            };
            label.delete_in_store(&store)?;
            println!("Removed {}", Colour::Red.paint(label.name()));
            Ok(())
        }
    }
}

fn find_or_bail(registry: &LabelRegistry, name: &str) -> Result<Arc<Label>> {
    match registry.find(name) {
        Some(label) => Ok(label),
        None => bail!("no label named `{name}`"),
    }
}

fn describe(label: &Label) -> String {
    let kind = if label.is_manual() {
        "manual"
    } else {
        "conditional"
    };
    let status = if label.is_active() {
        Colour::Green.paint("active")
    } else {
        Colour::Yellow.paint("inactive")
    };
    format!(
        "{}\t{kind}\t{status}\t(id {})",
        Colour::Cyan.paint(label.name()),
        label
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_owned()),
    )
}
