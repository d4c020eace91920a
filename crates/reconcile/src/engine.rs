// Archivo: engine.rs
// Propósito: implementar el scheduler de reconciliación: recorre una lista
// ordenada de reconciliadores en generaciones sucesivas hasta que ninguno
// pide `requeue`.
use crate::domain::ReconcileMeta;
use crate::errors::{ReconcileError, Result};
use crate::reconciler::{Reconciler, StateHandle};
use crate::repository::StateStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Función de espera entre generaciones. Recibe el número de la generación
/// que acaba de terminar (1-based).
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Política de espera entre generaciones.
#[derive(Clone)]
pub enum DelayPolicy {
    /// Siempre la misma espera.
    Fixed(Duration),
    /// `initial * factor^(generación-1)`, acotado por `max`.
    Backoff { initial: Duration, factor: u32, max: Duration },
    /// Función arbitraria del caller.
    Custom(DelayFn),
}

impl DelayPolicy {
    pub fn delay_for(&self, generation: u32) -> Duration {
        match self {
            DelayPolicy::Fixed(d) => *d,
            DelayPolicy::Backoff { initial, factor, max } => {
                let exp = generation.saturating_sub(1).min(31);
                let mult = factor.checked_pow(exp).unwrap_or(u32::MAX);
                initial.checked_mul(mult).map(|d| d.min(*max)).unwrap_or(*max)
            }
            DelayPolicy::Custom(f) => f(generation),
        }
    }
}

impl fmt::Debug for DelayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayPolicy::Fixed(d) => write!(f, "Fixed({:?})", d),
            DelayPolicy::Backoff { initial, factor, max } => {
                write!(f, "Backoff {{ initial: {:?}, factor: {}, max: {:?} }}", initial, factor, max)
            }
            DelayPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Configuración del scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub delay: DelayPolicy,
    /// Máximo de generaciones; `None` itera sin límite hasta converger.
    pub max_generations: Option<u32>,
}

impl Default for SchedulerConfig {
    /// 5s fijos y como mucho 120 generaciones (unos 10 minutos esperando a
    /// que converja la nube).
    fn default() -> Self {
        Self { delay: DelayPolicy::Fixed(Duration::from_secs(5)),
               max_generations: Some(120) }
    }
}

/// Sentido del recorrido.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Orden de declaración (crear).
    Apply,
    /// Orden inverso (borrar dependientes antes que sus dependencias).
    Purge,
}

/// Resumen de una ejecución completa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub direction: Direction,
    pub generations: u32,
    /// Reconciliadores que pidieron `requeue`, por generación.
    pub requeued: Vec<Vec<String>>,
}

/// Scheduler de reconciliación.
///
/// La lista de reconciliadores la construye el caller y se recibe en el
/// constructor; no hay registros globales. La ejecución es secuencial: el
/// orden es el mecanismo de corrección.
pub struct Scheduler<D>
    where D: Send + Sync
{
    reconcilers: Vec<Box<dyn Reconciler<D>>>,
    config: SchedulerConfig,
}

impl<D> Scheduler<D> where D: Send + Sync
{
    pub fn new(reconcilers: Vec<Box<dyn Reconciler<D>>>, config: SchedulerConfig) -> Self {
        Self { reconcilers, config }
    }

    /// Nombres de los reconciliadores en el orden en que se ejecutarían.
    pub fn order(&self, direction: Direction) -> Vec<&str> {
        self.ordered(direction).into_iter().map(|r| r.name()).collect()
    }

    fn ordered(&self, direction: Direction) -> Vec<&dyn Reconciler<D>> {
        let mut list: Vec<&dyn Reconciler<D>> = self.reconcilers.iter().map(|r| &**r).collect();
        if direction == Direction::Purge {
            list.reverse();
        }
        list
    }

    fn limit_reached(meta: &ReconcileMeta<'_, D>, max: u32, report: &RunReport) -> ReconcileError {
        let pending = report.requeued.last().cloned().unwrap_or_default();
        log::warn!("{} did not converge after {} generations, pending: {:?}", meta.identity, max, pending);
        ReconcileError::GenerationLimit { generations: max, pending }
    }

    /// Ejecuta generaciones hasta converger.
    ///
    /// - Un `Err` de cualquier reconciliador aborta inmediatamente; los
    ///   siguientes no se invocan.
    /// - Un `requeue` marca la generación como no convergida pero la
    ///   generación continúa con el resto.
    /// - Si alguien pidió `requeue`, se espera según `DelayPolicy` y se
    ///   vuelve a ejecutar la lista entera.
    pub async fn run(&self, meta: &ReconcileMeta<'_, D>, store: &dyn StateStore) -> Result<RunReport> {
        let direction = if meta.purge { Direction::Purge } else { Direction::Apply };
        let mut report = RunReport { direction,
                                     generations: 0,
                                     requeued: Vec::new() };

        loop {
            let generation = report.generations + 1;
            if let Some(max) = self.config.max_generations {
                if generation > max {
                    return Err(Self::limit_reached(meta, max, &report));
                }
            }
            report.generations = generation;
            log::info!("{} generation {} ({:?})", meta.identity, generation, direction);

            let mut pending = Vec::new();
            for reconciler in self.ordered(direction) {
                let name = reconciler.name();
                let handle = StateHandle::new(store, name, reconciler.owns(), reconciler.reads());
                match reconciler.reconcile(meta, &handle).await {
                    Ok(result) if result.requeue => {
                        log::debug!("{} requested requeue", name);
                        pending.push(name.to_string());
                    }
                    Ok(_) => log::debug!("{} converged", name),
                    Err(e) => {
                        log::error!("{} failed in generation {}: {}", name, generation, e);
                        return Err(ReconcileError::Reconciler { reconciler: name.to_string(),
                                                                source: Box::new(e) });
                    }
                }
            }

            if pending.is_empty() {
                log::info!("{} converged after {} generation(s)", meta.identity, generation);
                return Ok(report);
            }
            report.requeued.push(pending);
            if self.config.max_generations == Some(generation) {
                return Err(Self::limit_reached(meta, generation, &report));
            }

            let delay = self.config.delay.delay_for(generation);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
