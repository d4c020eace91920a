use crate::schema;
use crate::schema::resource_records::dsl as rr_dsl;
use chrono::DateTime;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use reconcile::{ReconcileError, ResourceRecord, Result, StateStore, StoreOpener};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
type DbPool = Pool<ConnectionManager<SqliteConnection>>;
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";
/// Pone cada conexión en modo de bloqueo exclusivo: mientras el almacén está
/// abierto ningún otro proceso puede leer ni escribir el fichero.
#[derive(Debug)]
struct ExclusiveLocking;
impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ExclusiveLocking {
  fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
    diesel::sql_query("PRAGMA locking_mode = EXCLUSIVE;").execute(conn)
                                                          .map_err(diesel::r2d2::Error::QueryError)?;
    diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(conn)
                                                     .map_err(diesel::r2d2::Error::QueryError)?;
    Ok(())
  }
}
/// Almacén de estado Diesel sobre un único fichero SQLite descargado.
///
/// El pool tiene exactamente una conexión. Abierto sin `writable`, las
/// escrituras devuelven `Immutable`.
pub struct DieselStateStore {
  pool: DbPool,
  path: PathBuf,
  writable: bool,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::resource_records)]
struct RecordRow {
  pub kind: String,
  pub record_key: String,
  pub body: String,
  pub updated_at_ts: i64,
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(|e| ReconcileError::Storage(format!("db: {}", e)))
}
fn row_to_record(row: RecordRow) -> Result<ResourceRecord> {
  let attributes =
    serde_json::from_str(&row.body).map_err(|e| ReconcileError::Corrupt(format!("{}/{}: {}", row.kind, row.record_key, e)))?;
  let updated_at = DateTime::from_timestamp_millis(row.updated_at_ts).ok_or_else(|| {
                                                                        ReconcileError::Corrupt(format!("{}/{}: timestamp {} \
                                                                                                         fuera de rango",
                                                                                                        row.kind,
                                                                                                        row.record_key,
                                                                                                        row.updated_at_ts))
                                                                      })?;
  Ok(ResourceRecord { key: row.record_key,
                      attributes,
                      updated_at })
}
/// Un fichero vacío es una base nueva; cualquier otro contenido debe
/// empezar con la cabecera de SQLite. Devuelve `true` si ya es una base.
fn check_header(path: &Path) -> Result<bool> {
  let mut file = match std::fs::File::open(path) {
    Ok(f) => f,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
    Err(e) => return Err(e.into()),
  };
  let mut header = Vec::with_capacity(SQLITE_HEADER.len());
  file.by_ref().take(SQLITE_HEADER.len() as u64).read_to_end(&mut header)?;
  if !header.is_empty() && header != SQLITE_HEADER {
    return Err(ReconcileError::Corrupt(format!("{} no es una base SQLite", path.display())));
  }
  Ok(!header.is_empty())
}
impl DieselStateStore {
  pub fn open(path: &Path, writable: bool) -> Result<Self> {
    let initialised = check_header(path)?;
    let url = path.to_str()
                  .ok_or_else(|| ReconcileError::Validation(format!("ruta no UTF-8: {}", path.display())))?;
    let manager = ConnectionManager::<SqliteConnection>::new(url);
    let pool = Pool::builder().max_size(1)
                              .connection_timeout(Duration::from_secs(5))
                              .connection_customizer(Box::new(ExclusiveLocking))
                              .build(manager)
                              .map_err(|e| ReconcileError::Corrupt(format!("{}: {}", path.display(), e)))?;
    let store = DieselStateStore { pool,
                                   path: path.to_path_buf(),
                                   writable };
    // Sólo lectura sobre una base existente: no se escribe el esquema.
    if writable || !initialised {
      let mut c = store.conn()?;
      c.run_pending_migrations(MIGRATIONS)
       .map_err(|e| ReconcileError::Corrupt(format!("{}: migraciones: {}", path.display(), e)))?;
    }
    log::debug!("opened state store {} (writable: {})", path.display(), writable);
    Ok(store)
  }
  pub fn path(&self) -> &Path {
    &self.path
  }
  fn conn_raw(&self) -> std::result::Result<PooledConnection<ConnectionManager<SqliteConnection>>, r2d2::Error> {
    self.pool.get()
  }
  fn conn(&self) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>> {
    self.conn_raw().map_err(|e| ReconcileError::Storage(format!("pool: {}", e)))
  }
  fn ensure_writable(&self) -> Result<()> {
    if self.writable {
      Ok(())
    } else {
      Err(ReconcileError::Immutable(format!("{} abierto en modo sólo lectura", self.path.display())))
    }
  }
}
impl StateStore for DieselStateStore {
  fn get(&self, kind: &str, key: &str) -> Result<Option<ResourceRecord>> {
    let mut conn = self.conn()?;
    let opt = map_db_err(rr_dsl::resource_records.filter(rr_dsl::kind.eq(kind))
                                                 .filter(rr_dsl::record_key.eq(key))
                                                 .first::<RecordRow>(&mut conn)
                                                 .optional())?;
    opt.map(row_to_record).transpose()
  }
  fn save(&self, kind: &str, record: ResourceRecord) -> Result<()> {
    self.ensure_writable()?;
    let mut conn = self.conn()?;
    let row = RecordRow { kind: kind.to_string(),
                          record_key: record.key,
                          body: serde_json::to_string(&record.attributes)?,
                          updated_at_ts: record.updated_at.timestamp_millis() };
    map_db_err(diesel::replace_into(rr_dsl::resource_records).values(&row).execute(&mut conn))?;
    Ok(())
  }
  fn remove(&self, kind: &str, key: &str) -> Result<()> {
    self.ensure_writable()?;
    let mut conn = self.conn()?;
    map_db_err(diesel::delete(rr_dsl::resource_records.filter(rr_dsl::kind.eq(kind))
                                                      .filter(rr_dsl::record_key.eq(key))).execute(&mut conn))?;
    Ok(())
  }
  fn enumerate(&self, kind: &str) -> Result<Vec<ResourceRecord>> {
    let mut conn = self.conn()?;
    let rows = map_db_err(rr_dsl::resource_records.filter(rr_dsl::kind.eq(kind))
                                                  .order(rr_dsl::record_key.asc())
                                                  .load::<RecordRow>(&mut conn))?;
    rows.into_iter().map(row_to_record).collect()
  }
}
/// Abre `DieselStateStore` sobre el fichero que descargó el guard.
#[derive(Debug, Default, Clone)]
pub struct SqliteStoreOpener;
impl StoreOpener for SqliteStoreOpener {
  type Store = DieselStateStore;
  fn open(&self, path: &Path, writable: bool) -> Result<Self::Store> {
    DieselStateStore::open(path, writable)
  }
}
