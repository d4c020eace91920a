// Archivo: scope.rs
// Propósito: ámbito de estado con lock: adquirir -> descargar -> abrir ->
// cuerpo -> subir -> liberar, con el mismo teardown en todas las salidas,
// incluida una interrupción por señal.
use crate::domain::Access;
use crate::errors::{ReconcileError, Result};
use crate::guard::RemoteStateGuard;
use crate::repository::{RemoteStorage, StateStore, StoreOpener};
use std::future::Future;
use std::sync::Arc;

/// Ejecuta `body` con el estado del cluster abierto.
///
/// - `Access::Writable`: toma el lock (falla con `AlreadyLocked` sin
///   esperar), descarga en modo escribible y al terminar sube el estado y
///   libera el lock, tanto si `body` tuvo éxito como si falló. El estado
///   hasta el último reconciliador exitoso se conserva y se sube.
/// - `Access::ReadOnly`: descarga sin lock a una copia privada, nunca
///   sube y borra la copia al terminar.
///
/// Si `interrupt` se completa antes que `body`, el cuerpo se cancela en su
/// siguiente punto de suspensión, se ejecuta el mismo teardown (subida sólo
/// si era escribible, después liberar) y se devuelve `Interrupted`.
pub async fn with_state<R, O, T, F, Fut, I>(guard: &RemoteStateGuard<R>,
                                            opener: &O,
                                            access: Access,
                                            operation: &str,
                                            interrupt: I,
                                            body: F)
                                            -> Result<T>
    where R: RemoteStorage,
          O: StoreOpener,
          F: FnOnce(Arc<O::Store>) -> Fut,
          Fut: Future<Output = Result<T>>,
          I: Future<Output = ()>
{
    if access.is_writable() {
        guard.acquire_lock(operation).await?;
    }

    let store = match open_state(guard, opener, access).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            // Un almacén que no se pudo abrir nunca se sube; sólo se libera el lock.
            release_best_effort(guard).await;
            discard_best_effort(guard, access).await;
            return Err(e);
        }
    };

    let outcome = tokio::select! {
        res = body(store.clone()) => Some(res),
        _ = interrupt => None,
    };

    let flushed = if access.is_writable() { store.flush() } else { Ok(()) };
    drop(store);
    discard_best_effort(guard, access).await;

    match outcome {
        Some(Ok(value)) => {
            if let Err(e) = flushed {
                release_best_effort(guard).await;
                return Err(e);
            }
            teardown(guard, true).await?;
            Ok(value)
        }
        Some(Err(e)) => {
            if let Err(te) = teardown(guard, flushed.is_ok()).await {
                log::error!("{} teardown after failed {} also failed: {}", guard.identity(), operation, te);
            }
            Err(e)
        }
        None => {
            log::warn!("{} {} interrupted, running teardown", guard.identity(), operation);
            if let Err(te) = teardown(guard, flushed.is_ok()).await {
                log::error!("{} teardown after interrupt failed: {}", guard.identity(), te);
            }
            Err(ReconcileError::Interrupted)
        }
    }
}

async fn open_state<R, O>(guard: &RemoteStateGuard<R>, opener: &O, access: Access) -> Result<O::Store>
    where R: RemoteStorage,
          O: StoreOpener
{
    let path = guard.download(access.is_writable()).await?;
    opener.open(&path, access.is_writable())
}

/// Sube (si corresponde) y libera el lock. Intenta ambas cosas aunque la
/// primera falle y devuelve el primer error.
async fn teardown<R>(guard: &RemoteStateGuard<R>, upload: bool) -> Result<()>
    where R: RemoteStorage
{
    let mut first_err = None;
    if upload && guard.needs_upload()? {
        if let Err(e) = guard.upload().await {
            log::error!("{} upload failed: {}", guard.identity(), e);
            first_err = Some(e);
        }
    }
    if guard.holds_lock()? {
        if let Err(e) = guard.release_lock().await {
            log::error!("{} release_lock failed: {}", guard.identity(), e);
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn release_best_effort<R>(guard: &RemoteStateGuard<R>)
    where R: RemoteStorage
{
    if matches!(guard.holds_lock(), Ok(true)) {
        if let Err(e) = guard.release_lock().await {
            log::error!("{} release_lock failed: {}", guard.identity(), e);
        }
    }
}

async fn discard_best_effort<R>(guard: &RemoteStateGuard<R>, access: Access)
    where R: RemoteStorage
{
    if !access.is_writable() {
        if let Err(e) = guard.discard_read_only().await {
            log::warn!("{} cannot remove read-only copy: {}", guard.identity(), e);
        }
    }
}

/// Se completa al recibir SIGINT o SIGTERM (sólo Ctrl-C fuera de Unix).
/// Si no se puede registrar el handler, queda pendiente para siempre.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c_or_pending() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                log::error!("cannot listen for SIGTERM: {}", e);
                ctrl_c_or_pending().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c_or_pending().await;
}

async fn ctrl_c_or_pending() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
