//! Terminal presentation: a progress bar over the batch and a colored summary.
//!
//! Uses `indicatif` for the bar and `console` for styling. Logging goes
//! through `tracing`; this module only draws what a person watching the
//! run wants to see.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::JobSpec;
use crate::dispatcher::BatchSummary;
use crate::encoding::{Rendition, absolute_output_path};
use crate::report::BatchReport;
use crate::state_machine::JobStatus;

const BAR_TEMPLATE: &str =
    "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";

/// Progress of the whole batch: the bar advances as jobs reach a terminal status.
pub struct BatchProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl BatchProgress {
    pub fn start(total_jobs: usize) -> Self {
        let pb = ProgressBar::new(total_jobs as u64);
        // Fall back to the default bar if the template is rejected.
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Redraw after a pass of the batch loop.
    pub fn update(&self, summary: &BatchSummary) {
        self.pb.set_position(summary.finished() as u64);
        self.pb.set_message(pass_message(summary));
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    /// Print one line per job followed by the counts.
    pub fn print_report(&self, report: &BatchReport) {
        println!();
        for job in &report.jobs {
            let id = job.encoding_id.as_deref().unwrap_or("-");
            match job.status {
                JobStatus::Successful => println!(
                    "  {} {} ({id}) retries: {}",
                    self.green.apply_to("✓"),
                    job.name,
                    job.retry_count
                ),
                JobStatus::GivenUp => {
                    println!(
                        "  {} {} ({id}) retries: {}",
                        self.red.apply_to("✗"),
                        job.name,
                        job.retry_count
                    );
                    for message in &job.error_messages {
                        println!("      {}", self.yellow.apply_to(message));
                    }
                }
                status => println!("  {} {} {status}", self.yellow.apply_to("…"), job.name),
            }
        }

        let headline = if report.given_up == 0 {
            self.green.apply_to(format!(
                "All {} encodings finished successfully",
                report.total
            ))
        } else {
            self.red.apply_to(format!(
                "{} of {} encodings could not be finished",
                report.given_up, report.total
            ))
        };
        println!();
        println!("{headline} in {:.1}s", report.duration_ms as f64 / 1000.0);
        println!("{}", self.yellow.apply_to(format!("Run id: {}", report.run_id)));
    }
}

fn pass_message(summary: &BatchSummary) -> String {
    format!(
        "waiting {} · started {} · successful {} · given up {}",
        summary.waiting, summary.started, summary.successful, summary.given_up
    )
}

/// Print a job and where each of its renditions will be written.
pub fn print_plan(jobs: &[JobSpec], renditions: &[Rendition], base_path: &str) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    for job in jobs {
        println!("{} <- {}", bold.apply_to(&job.name), job.input_path);
        for rendition in renditions {
            let path = absolute_output_path(base_path, &rendition.muxing_path(&job.output_path));
            println!("    {:<16} {}", rendition.name(), dim.apply_to(path));
        }
    }
    println!();
    println!("{} jobs, {} renditions each", jobs.len(), renditions.len());
}
