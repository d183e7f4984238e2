//! Device → entity mapping handlers. These work on the persisted store
//! only; the next hub sync picks the new mapping up.

use serde::Serialize;
use tabled::Tabled;

use hassdeck_config::{Config, MAPPINGS_KEY};
use hassdeck_core::{DeviceId, EntityId};

use crate::cli::{GlobalOpts, MapArgs, MapCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Clone, Serialize, Tabled)]
struct MappingRow {
    #[tabled(rename = "Device")]
    device: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Entity")]
    entity: String,
}

pub fn handle(args: MapArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let store = config::open_store(global, cfg)?;
    let mut mapping = store.load_mapping();

    match args.command {
        MapCommand::List => {
            let devices = store.load_devices();
            let rows: Vec<MappingRow> = mapping
                .iter()
                .map(|(id, entity)| MappingRow {
                    device: id.0,
                    name: devices
                        .iter()
                        .find(|d| d.id == id)
                        .map_or_else(|| output::muted("(removed)"), |d| d.name.clone()),
                    entity: entity.to_string(),
                })
                .collect();
            let out = output::render_list(
                &global.output,
                &rows,
                MappingRow::clone,
                |r| format!("{}\t{}", r.device, r.entity),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        MapCommand::Set { id, entity } => {
            util::find_device(&store.load_devices(), id)?;
            let entity = parse_entity(&entity)?;
            mapping.insert(DeviceId(id), entity.clone());
            store.save(MAPPINGS_KEY, &mapping)?;
            output::print_output(
                &output::success(&format!("Device {id} → {entity}")),
                global.quiet,
            );
            Ok(())
        }

        MapCommand::Remove { id } => {
            if mapping.remove(DeviceId(id)).is_none() {
                return Err(CliError::NotMapped { id });
            }
            store.save(MAPPINGS_KEY, &mapping)?;
            output::print_output(&output::success(&format!("Device {id} unmapped")), global.quiet);
            Ok(())
        }
    }
}

/// Entity ids are `<domain>.<object_id>`.
fn parse_entity(raw: &str) -> Result<EntityId, CliError> {
    match raw.split_once('.') {
        Some((domain, object)) if !domain.is_empty() && !object.is_empty() => {
            Ok(EntityId::from(raw))
        }
        _ => Err(CliError::Validation {
            field: "entity".into(),
            reason: format!("expected <domain>.<object_id>, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_need_a_domain() {
        assert_eq!(parse_entity("light.hall").unwrap().domain(), "light");
        assert!(parse_entity("hall").is_err());
        assert!(parse_entity(".hall").is_err());
        assert!(parse_entity("light.").is_err());
    }
}
