use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use tracing::{debug, info};

use super::{ServiceHandle, Worker};
use crate::config::PrintingConfig;
use crate::error::ServiceError;
use crate::events::PrintJob;
use crate::platform::shell::{CommandRunner, run_checked, shell_quote};

/// A destination that accepts print sheets.
pub trait Printer: Send {
    /// Check the printer can accept jobs right now.
    fn probe(&mut self) -> Result<()>;

    fn print(&mut self, sheet: &Path, job: &PrintJob) -> Result<()>;
}

/// CUPS printer reached through `lp`/`lpstat`.
pub struct LpPrinter {
    runner: CommandRunner,
    destination: Option<String>,
    title: String,
    options: Vec<String>,
}

impl LpPrinter {
    pub fn new(cfg: &PrintingConfig, runner: CommandRunner) -> Self {
        Self {
            runner,
            destination: cfg.printer.clone(),
            title: cfg.job_title.clone(),
            options: cfg.options.clone(),
        }
    }

    fn print_command(&self, sheet: &Path) -> String {
        let mut command = String::from("lp");
        if let Some(destination) = &self.destination {
            command.push_str(" -d ");
            command.push_str(&shell_quote(destination));
        }
        command.push_str(" -t ");
        command.push_str(&shell_quote(&self.title));
        for option in &self.options {
            command.push_str(" -o ");
            command.push_str(&shell_quote(option));
        }
        command.push(' ');
        command.push_str(&shell_quote(&sheet.to_string_lossy()));
        command
    }
}

impl Printer for LpPrinter {
    fn probe(&mut self) -> Result<()> {
        let scheduler = run_checked(&self.runner, "lpstat -r")?;
        ensure!(
            !scheduler.stdout.contains("not running"),
            "CUPS scheduler is not running"
        );
        match &self.destination {
            Some(name) => {
                let status = run_checked(&self.runner, &format!("lpstat -p {}", shell_quote(name)))
                    .with_context(|| format!("printer {name} is not known to CUPS"))?;
                ensure!(
                    !status.stdout.contains("disabled"),
                    "printer {name} is disabled"
                );
            }
            None => {
                let default = run_checked(&self.runner, "lpstat -d")?;
                ensure!(
                    default.stdout.contains("system default destination:"),
                    "no default printer configured"
                );
            }
        }
        Ok(())
    }

    fn print(&mut self, sheet: &Path, job: &PrintJob) -> Result<()> {
        let output = run_checked(&self.runner, &self.print_command(sheet))?;
        info!(
            session = job.session_id,
            copy = job.copy,
            response = output.stdout.trim(),
            "print job submitted"
        );
        Ok(())
    }
}

/// Printer stand-in that only logs.
#[derive(Debug, Default)]
pub struct SimulatedPrinter;

impl Printer for SimulatedPrinter {
    fn probe(&mut self) -> Result<()> {
        Ok(())
    }

    fn print(&mut self, sheet: &Path, job: &PrintJob) -> Result<()> {
        info!(
            session = job.session_id,
            copy = job.copy,
            sheet = %sheet.display(),
            "simulated print"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintReceipt {
    pub session_id: u64,
    pub copy: u32,
}

/// Prints queued jobs one at a time, pausing after each while the printer works.
pub struct PrintWorker {
    printer: Box<dyn Printer>,
    dwell: Duration,
    spool_dir: PathBuf,
}

impl PrintWorker {
    pub fn new(printer: Box<dyn Printer>, dwell: Duration, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            printer,
            dwell,
            spool_dir: spool_dir.into(),
        }
    }

    fn sheet_for(&self, job: &PrintJob) -> Result<PathBuf> {
        if let Some(path) = &job.path {
            return Ok(path.clone());
        }
        fs::create_dir_all(&self.spool_dir)
            .with_context(|| format!("failed to create {}", self.spool_dir.display()))?;
        let path = self.spool_dir.join(format!("session-{}.png", job.session_id));
        if !path.exists() {
            job.image
                .save(&path)
                .with_context(|| format!("failed to spool {}", path.display()))?;
            debug!(path = %path.display(), "spooled print sheet");
        }
        Ok(path)
    }
}

impl Worker for PrintWorker {
    type Request = PrintJob;
    type Output = PrintReceipt;
    const NAME: &'static str = "print";

    fn perform(&mut self, job: PrintJob) -> Result<PrintReceipt> {
        let sheet = self.sheet_for(&job)?;
        self.printer.print(&sheet, &job)?;
        if !self.dwell.is_zero() {
            thread::sleep(self.dwell);
        }
        Ok(PrintReceipt {
            session_id: job.session_id,
            copy: job.copy,
        })
    }
}

pub type PrintService = ServiceHandle<PrintWorker>;

impl ServiceHandle<PrintWorker> {
    /// Append a job to the print FIFO.
    pub fn enqueue(&self, job: PrintJob) -> Result<(), ServiceError> {
        debug!(session = job.session_id, copy = job.copy, "enqueue print job");
        self.request(job).map(drop)
    }
}
