use anyhow::Result;

use crate::sandbox::schema;

pub fn run() -> Result<()> {
    println!("{}", schema::format_table());
    Ok(())
}
