// manifest.rs
// Carga de manifiestos YAML (o JSON) desde un fichero o desde stdin ("-").
use crate::DomainError;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::path::Path;

/// Validación semántica de una declaración ya deserializada.
pub trait Validate {
  fn check(&self) -> Result<(), DomainError>;
}

/// Deserializa y valida un manifiesto en texto.
pub fn parse_declaration<T>(text: &str) -> Result<T, DomainError>
  where T: DeserializeOwned + Validate
{
  let declaration: T = serde_yaml::from_str(text)?;
  declaration.check()?;
  Ok(declaration)
}

/// Lee el manifiesto de `source` (`-` es stdin) y lo valida.
pub fn load_declaration<T>(source: &str) -> Result<T, DomainError>
  where T: DeserializeOwned + Validate
{
  let text = if source == "-" {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    buf
  } else {
    std::fs::read_to_string(Path::new(source)).map_err(|e| DomainError::IoError(format!("{}: {}", source, e)))?
  };
  parse_declaration(&text)
}
