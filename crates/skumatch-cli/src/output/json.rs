use serde::Serialize;
use skumatch_core::error::SkumatchError;

pub fn print<T: Serialize>(value: &T) -> Result<(), SkumatchError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
