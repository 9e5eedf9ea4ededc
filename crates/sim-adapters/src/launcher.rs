//! Lanzador de procesos sobre tokio.
//!
//! Cada proceso corre en su propia tarea; su fin (código o kill) llega al
//! driver por un canal `mpsc` sin límite. El scheduler sigue siendo
//! síncrono: el driver recibe el `ProcessReport` y llama a
//! `on_solver_process_death`.
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, warn};
use sim_core::{JobSignature, LaunchError, ProcessExit, ProcessLauncher, ProcessRequest};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::error::AdapterError;

/// Fin de un proceso lanzado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub signature: JobSignature,
    pub exit: ProcessExit,
}

/// Canal de kill de cada proceso vivo, con el número de lanzamiento que lo
/// creó. La tarea del proceso borra su propia entrada al terminar.
type KillMap = Arc<Mutex<HashMap<JobSignature, (u64, oneshot::Sender<()>)>>>;

fn lock(kills: &KillMap) -> MutexGuard<'_, HashMap<JobSignature, (u64, oneshot::Sender<()>)>> {
    kills.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TokioLauncher {
    handle: Handle,
    reports: mpsc::UnboundedSender<ProcessReport>,
    kills: KillMap,
    launches: u64,
}

impl TokioLauncher {
    pub fn new(handle: Handle) -> (Self, mpsc::UnboundedReceiver<ProcessReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { handle,
                reports: tx,
                kills: KillMap::default(),
                launches: 0 },
         rx)
    }

    /// Usa el runtime actual; falla fuera de un contexto tokio.
    pub fn current() -> Result<(Self, mpsc::UnboundedReceiver<ProcessReport>), AdapterError> {
        let handle = Handle::try_current().map_err(|e| AdapterError::NoRuntime(e.to_string()))?;
        Ok(Self::new(handle))
    }

    /// Procesos lanzados que todavía no terminaron.
    pub fn live_count(&self) -> usize {
        lock(&self.kills).len()
    }
}

impl ProcessLauncher for TokioLauncher {
    fn launch(&mut self, request: ProcessRequest) -> Result<(), LaunchError> {
        let _guard = self.handle.enter();
        let ProcessRequest { signature,
                             program,
                             args,
                             working_dir } = request;
        debug!("spawning {program} {} in {}", args.join(" "), working_dir.display());
        let mut child = Command::new(&program).args(&args)
                                              .current_dir(&working_dir)
                                              .stdin(Stdio::null())
                                              .kill_on_drop(true)
                                              .spawn()
                                              .map_err(|e| LaunchError::Spawn { program: program.clone(),
                                                                                reason: e.to_string() })?;

        let (kill_tx, kill_rx) = oneshot::channel();
        self.launches += 1;
        let launch_id = self.launches;
        lock(&self.kills).insert(signature.clone(), (launch_id, kill_tx));
        let kills = Arc::clone(&self.kills);
        let reports = self.reports.clone();
        self.handle.spawn(async move {
                       let waited = tokio::select! {
                           status = child.wait() => Some(status),
                           Ok(()) = kill_rx => None,
                       };
                       let exit = match waited {
                           Some(Ok(status)) => ProcessExit::Code(status.code().unwrap_or(-1)),
                           Some(Err(e)) => {
                               error!("{signature}: wait failed: {e}");
                               ProcessExit::Code(-1)
                           }
                           None => {
                               if let Err(e) = child.kill().await {
                                   warn!("{signature}: kill failed: {e}");
                               }
                               ProcessExit::Killed
                           }
                       };
                       {
                           let mut live = lock(&kills);
                           if live.get(&signature).is_some_and(|(id, _)| *id == launch_id) {
                               live.remove(&signature);
                           }
                       }
                       if reports.send(ProcessReport { signature, exit }).is_err() {
                           debug!("process report dropped, driver gone");
                       }
                   });
        Ok(())
    }

    fn kill(&mut self, signature: &JobSignature) -> Result<(), LaunchError> {
        match lock(&self.kills).remove(signature) {
            Some((_, tx)) => tx.send(()).map_err(|_| LaunchError::NotRunning(signature.to_string())),
            None => Err(LaunchError::NotRunning(signature.to_string())),
        }
    }
}
