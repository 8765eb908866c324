//! @PG provenance records for output BAM headers.
//!
//! Every command stamps the header it writes with a `lamprey` program record
//! carrying the version and the original command line, chained to the last
//! program already in the header via `PP`. Ids collide across repeated runs,
//! so a numeric suffix is appended until unique.

use std::collections::HashSet;

use anyhow::Result;
use bstr::BString;
use noodles::sam::Header;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::Program;
use noodles::sam::header::record::value::map::program::tag;

const PROGRAM_NAME: &str = "lamprey";

/// The id of the last program in the header's @PG chain: the one no other
/// program names as its `PP`.
#[must_use]
pub fn last_program_id(header: &Header) -> Option<String> {
    let programs = header.programs();
    let program_map = programs.as_ref();
    if program_map.is_empty() {
        return None;
    }

    let mut referenced: HashSet<&[u8]> = HashSet::new();
    for (_id, pg) in program_map {
        if let Some(pp) = pg.other_fields().get(&tag::PREVIOUS_PROGRAM_ID) {
            referenced.insert(pp.as_ref());
        }
    }
    for (id, _pg) in program_map {
        if !referenced.contains(id.as_slice()) {
            return Some(String::from_utf8_lossy(id).to_string());
        }
    }
    // A cyclic chain is malformed input; chain onto any program.
    program_map.keys().next().map(|id| String::from_utf8_lossy(id).to_string())
}

/// Picks `lamprey`, or `lamprey.1`, `lamprey.2`, ... on collision.
#[must_use]
pub fn unique_program_id(header: &Header) -> String {
    let programs = header.programs();
    let program_map = programs.as_ref();
    if !program_map.contains_key(PROGRAM_NAME.as_bytes()) {
        return PROGRAM_NAME.to_string();
    }
    for i in 1..=1000 {
        let candidate = format!("{PROGRAM_NAME}.{i}");
        if !program_map.contains_key(candidate.as_bytes()) {
            return candidate;
        }
    }
    format!("{PROGRAM_NAME}.{}", std::process::id())
}

/// Appends a `lamprey` @PG record with PP chaining to the existing chain.
///
/// # Errors
///
/// Returns an error when the program record cannot be built or added.
pub fn add_pg_record(mut header: Header, version: &str, command_line: &str) -> Result<Header> {
    let previous_program = last_program_id(&header);
    let unique_id = unique_program_id(&header);

    let mut builder = Map::<Program>::builder()
        .insert(tag::NAME, PROGRAM_NAME)
        .insert(tag::VERSION, version)
        .insert(tag::COMMAND_LINE, command_line);
    if let Some(pp) = previous_program.as_deref() {
        builder = builder.insert(tag::PREVIOUS_PROGRAM_ID, pp);
    }
    let pg_record = builder.build()?;

    header.programs_mut().add(BString::from(unique_id), pg_record)?;
    Ok(header)
}
