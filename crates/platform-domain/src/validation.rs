// validation.rs
// Reglas de formato compartidas por las declaraciones.
use crate::DomainError;
use std::net::Ipv4Addr;

pub const MIN_CIDR_PREFIX: u8 = 16;
pub const MAX_CIDR_PREFIX: u8 = 24;

fn invalid(msg: String) -> DomainError {
  DomainError::ValidationError(msg)
}

/// Nombre de recurso: 1..=40 caracteres, minúsculas, dígitos y guiones,
/// empieza por letra y no termina en guion.
pub fn check_name(field: &str, value: &str) -> Result<(), DomainError> {
  if value.is_empty() || value.len() > 40 {
    return Err(invalid(format!("{} debe tener entre 1 y 40 caracteres", field)));
  }
  if !value.starts_with(|c: char| c.is_ascii_lowercase()) || value.ends_with('-') {
    return Err(invalid(format!("{} '{}' debe empezar por letra minúscula y no terminar en guion", field, value)));
  }
  if !value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
    return Err(invalid(format!("{} '{}' contiene caracteres inválidos", field, value)));
  }
  Ok(())
}

/// Región tipo `eu-west-1` o `us-gov-west-1`.
pub fn check_region(value: &str) -> Result<(), DomainError> {
  let parts: Vec<&str> = value.split('-').collect();
  let (last, head) = match parts.split_last() {
    Some(split) => split,
    None => return Err(invalid("región vacía".to_string())),
  };
  if head.len() < 2
     || head.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_lowercase()))
     || last.is_empty()
     || !last.chars().all(|c| c.is_ascii_digit())
  {
    return Err(invalid(format!("región '{}' inválida (ejemplo: eu-west-1)", value)));
  }
  Ok(())
}

/// Cuenta: exactamente 12 dígitos.
pub fn check_account_id(value: &str) -> Result<(), DomainError> {
  if value.len() != 12 || !value.chars().all(|c| c.is_ascii_digit()) {
    return Err(invalid(format!("account_id '{}' debe tener exactamente 12 dígitos", value)));
  }
  Ok(())
}

/// Bloque CIDR IPv4 de red (sin bits de host) con prefijo entre 16 y 24.
pub fn check_cidr(value: &str) -> Result<(Ipv4Addr, u8), DomainError> {
  let (addr, prefix) = value.split_once('/')
                            .ok_or_else(|| invalid(format!("CIDR '{}' sin prefijo", value)))?;
  let addr: Ipv4Addr = addr.parse()
                           .map_err(|_| invalid(format!("CIDR '{}' con dirección inválida", value)))?;
  let prefix: u8 = prefix.parse()
                         .map_err(|_| invalid(format!("CIDR '{}' con prefijo inválido", value)))?;
  if !(MIN_CIDR_PREFIX..=MAX_CIDR_PREFIX).contains(&prefix) {
    return Err(invalid(format!("el prefijo de '{}' debe estar entre /{} y /{}",
                               value, MIN_CIDR_PREFIX, MAX_CIDR_PREFIX)));
  }
  let mask = u32::MAX << (32 - u32::from(prefix));
  if u32::from(addr) & !mask != 0 {
    return Err(invalid(format!("'{}' no es una dirección de red (bits de host a uno)", value)));
  }
  Ok((addr, prefix))
}

/// Dominio con al menos dos etiquetas DNS válidas.
pub fn check_domain(value: &str) -> Result<(), DomainError> {
  let labels: Vec<&str> = value.split('.').collect();
  if value.len() > 253 || labels.len() < 2 {
    return Err(invalid(format!("dominio '{}' inválido", value)));
  }
  for label in labels {
    check_dns_label(value, label)?;
  }
  Ok(())
}

/// Una sola etiqueta DNS (también usada para subdominios).
pub fn check_dns_label(context: &str, label: &str) -> Result<(), DomainError> {
  if label.is_empty()
     || label.len() > 63
     || label.starts_with('-')
     || label.ends_with('-')
     || !label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
  {
    return Err(invalid(format!("etiqueta '{}' inválida en '{}'", label, context)));
  }
  Ok(())
}

/// Identificador de base de datos: letra inicial, letras, dígitos y `_`.
pub fn check_database_name(value: &str) -> Result<(), DomainError> {
  if value.is_empty()
     || value.len() > 63
     || !value.starts_with(|c: char| c.is_ascii_lowercase())
     || !value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
  {
    return Err(invalid(format!("nombre de base de datos '{}' inválido", value)));
  }
  Ok(())
}
