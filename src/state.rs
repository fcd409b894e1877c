//! # Whole-Machine Snapshots
//!
//! A snapshot is one opaque byte blob holding the CPU followed by every device
//! on the bus, in registration order:
//!
//! ```text
//! "VCSS"  u32 version  u32 section-count
//! ( str name  blob payload ) * section-count
//! ```
//!
//! Capture is all-or-nothing: if any component refuses to serialize, no blob
//! is produced. Restore is transactional: the whole blob is validated against
//! the current machine layout before any component is touched, and if a
//! component fails to load part-way through, the machine is rolled back to the
//! state it had before the call.

use log::{debug, warn};

use crate::serializer::{Deserializer, Serializable, Serializer, StateError};
use crate::System;

/// Leading bytes of every snapshot.
pub const STATE_MAGIC: [u8; 4] = *b"VCSS";

/// Current snapshot layout version.
pub const STATE_VERSION: u32 = 1;

/// Serialize the complete machine.
pub fn capture(system: &System) -> Result<Vec<u8>, StateError> {
    let bus = system.bus();
    let mut out = Serializer::new();
    out.put_bytes(&STATE_MAGIC);
    out.put_u32(STATE_VERSION);
    out.put_u32(1 + bus.device_count() as u32);

    write_section(&mut out, system.cpu())?;
    for device in bus.devices() {
        write_section(&mut out, device)?;
    }

    let bytes = out.into_bytes();
    debug!("captured machine state ({} bytes)", bytes.len());
    Ok(bytes)
}

/// Replace the machine state with the one in `blob`.
///
/// On error the machine is left exactly as it was.
pub fn restore(system: &mut System, blob: &[u8]) -> Result<(), StateError> {
    let sections = read_sections(system, blob)?;
    let backup = capture(system)?;

    if let Err(err) = apply(system, &sections) {
        warn!("state restore failed, rolling back: {}", err);
        let previous = read_sections(system, &backup)?;
        apply(system, &previous)?;
        return Err(err);
    }
    Ok(())
}

fn write_section<S: Serializable + ?Sized>(
    out: &mut Serializer,
    component: &S,
) -> Result<(), StateError> {
    let mut section = Serializer::new();
    component.save(&mut section)?;
    out.put_str(component.name());
    out.put_blob(&section.into_bytes());
    Ok(())
}

struct Section<'a> {
    name: String,
    payload: &'a [u8],
}

/// Decode the framing of `blob` and check it matches `system`'s layout.
fn read_sections<'a>(system: &System, blob: &'a [u8]) -> Result<Vec<Section<'a>>, StateError> {
    let mut input = Deserializer::new(blob);
    if input.get_bytes(STATE_MAGIC.len())? != STATE_MAGIC {
        return Err(StateError::BadMagic);
    }
    let version = input.get_u32()?;
    if version != STATE_VERSION {
        return Err(StateError::Version {
            expected: STATE_VERSION,
            found: version,
        });
    }

    let expected: Vec<&'static str> = std::iter::once(system.cpu().name())
        .chain(system.bus().devices().map(|d| d.name()))
        .collect();
    let count = input.get_u32()? as usize;
    if count != expected.len() {
        return Err(StateError::DeviceMismatch {
            expected: format!("{} components", expected.len()),
            found: format!("{} components", count),
        });
    }

    let mut sections = Vec::with_capacity(count);
    for want in expected {
        let name = input.get_str()?;
        if name != want {
            return Err(StateError::DeviceMismatch {
                expected: want.to_string(),
                found: name,
            });
        }
        let payload = input.get_blob()?;
        sections.push(Section { name, payload });
    }

    if !input.is_empty() {
        return Err(StateError::TrailingData {
            device: "snapshot".to_string(),
            remaining: input.remaining(),
        });
    }
    Ok(sections)
}

fn apply(system: &mut System, sections: &[Section<'_>]) -> Result<(), StateError> {
    let Some((cpu_section, device_sections)) = sections.split_first() else {
        return Ok(());
    };
    let (cpu, bus) = system.parts_mut();
    load_section(cpu, cpu_section)?;
    for (device, section) in bus.devices_mut().zip(device_sections) {
        load_section(device, section)?;
    }
    Ok(())
}

fn load_section<S: Serializable + ?Sized>(
    component: &mut S,
    section: &Section<'_>,
) -> Result<(), StateError> {
    let mut input = Deserializer::new(section.payload);
    component.load(&mut input)?;
    if !input.is_empty() {
        return Err(StateError::TrailingData {
            device: section.name.clone(),
            remaining: input.remaining(),
        });
    }
    Ok(())
}
