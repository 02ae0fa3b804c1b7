//! CLI Handler for Exam Coord
//!
//! Provides command-line interface functionality for:
//! - Serving the rendezvous and coordinator endpoints
//! - Resolving the coordinator through the rendezvous
//! - Session operations against the coordinator

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, Subcommand};
use tracing::info;
use crate::config::Config;
use crate::coordinator::CoordinationContext;
use crate::discovery::{coordinator_addr, DiscoveryClient, SessionClient};
use crate::error::CoordError;
use crate::server::Server;
use crate::types::ExamDraft;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (created with defaults when missing)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Rendezvous address; defaults to host:base_port from the configuration
    #[arg(short, long, global = true)]
    pub rendezvous: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the simulated cluster and serve its endpoints
    Serve,
    /// Print the current coordinator
    Leader,
    /// Show every node's clock, load and replicas
    Status,
    /// List scheduled exams
    Schedule {
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Register for an exam
    Register {
        #[arg(short, long)]
        exam: String,
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Create an exam on the least-loaded node
    CreateExam {
        #[arg(short, long)]
        exam: String,
        /// Duration in minutes
        #[arg(short, long, default_value_t = 60)]
        duration: u32,
    },
}

pub struct CliHandler {
    config: Config,
    rendezvous: SocketAddr,
}

impl CliHandler {
    pub fn new(config: Config, rendezvous: Option<SocketAddr>) -> Result<Self, CoordError> {
        let rendezvous = match rendezvous {
            Some(addr) => addr,
            None => config.cluster.rendezvous_addr()?,
        };
        Ok(Self { config, rendezvous })
    }

    pub fn load(path: Option<PathBuf>, rendezvous: Option<SocketAddr>) -> Result<Self, CoordError> {
        let path = path.unwrap_or_else(Config::get_config_path);
        Self::new(Config::load(&path)?, rendezvous)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn handle(&self, command: &Commands) -> Result<(), CoordError> {
        match command {
            Commands::Serve => self.serve().await,
            Commands::Leader => self.leader().await,
            Commands::Status => self.status().await,
            Commands::Schedule { session } => self.schedule(session.clone()).await,
            Commands::Register { exam, session } => self.register(exam, session.clone()).await,
            Commands::CreateExam { exam, duration } => self.create_exam(exam, *duration).await,
        }
    }

    pub async fn serve(&self) -> Result<(), CoordError> {
        let ctx = Arc::new(CoordinationContext::from_config(&self.config)?);
        info!(
            "Starting {} nodes, coordinator {}",
            self.config.cluster.node_count,
            ctx.resolve_coordinator()?.node_id
        );
        let server = Server::new(ctx);
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        };
        server.run(&self.config.cluster, shutdown).await
    }

    async fn connect(&self, session: Option<String>) -> Result<SessionClient, CoordError> {
        DiscoveryClient::new(self.rendezvous)?.connect(session).await
    }

    pub async fn leader(&self) -> Result<(), CoordError> {
        let leader = DiscoveryClient::new(self.rendezvous)?.resolve_coordinator().await?;
        println!(
            "Coordinator: {} at {}",
            leader.node_id,
            coordinator_addr(self.rendezvous, leader.offset)?
        );
        Ok(())
    }

    pub async fn status(&self) -> Result<(), CoordError> {
        let client = self.connect(None).await?;
        println!("\nCluster status ({}):", client.coordinator());
        for node in client.cluster_status().await? {
            println!(
                "  {} {:?} clock={} load={} reachable={} replicas={:?}",
                node.id, node.role, node.logical_clock, node.load, node.reachable, node.replica_keys
            );
        }
        Ok(())
    }

    pub async fn schedule(&self, session: Option<String>) -> Result<(), CoordError> {
        let client = self.connect(session).await?;
        let exams = client.read_schedule().await?;
        if exams.is_empty() {
            println!("No exams scheduled.");
            return Ok(());
        }
        println!("\nExam Schedule:");
        for exam in exams {
            println!(
                "  {:>3} {:<20} {} {} {}min marks={} registered={}",
                exam.id,
                exam.name,
                exam.exam_date,
                exam.start_time,
                exam.duration,
                exam.marks,
                exam.students_registered
            );
        }
        Ok(())
    }

    pub async fn register(&self, exam: &str, session: Option<String>) -> Result<(), CoordError> {
        let client = self.connect(session).await?;
        let reply = client.register(exam).await?;
        println!("{} (session {})", reply.message, client.session_code());
        Ok(())
    }

    pub async fn create_exam(&self, exam: &str, duration: u32) -> Result<(), CoordError> {
        let client = self.connect(None).await?;
        let mut draft = ExamDraft::new(exam, Vec::new());
        draft.duration = duration;
        let created = client.create_exam(&draft).await?;
        println!(
            "Exam '{}' created on {} (replicated to {:?})",
            created.record.name, created.owner, created.replication.delivered
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_register() {
        let cli = Cli::parse_from(["exam-coord", "register", "--exam", "DSGT", "-r", "127.0.0.1:6000"]);
        assert_eq!(cli.rendezvous, Some("127.0.0.1:6000".parse().unwrap()));
        match cli.command {
            Commands::Register { exam, session } => {
                assert_eq!(exam, "DSGT");
                assert!(session.is_none());
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_default_rendezvous_from_config() {
        let handler = CliHandler::new(Config::default(), None).unwrap();
        assert_eq!(handler.rendezvous.to_string(), "127.0.0.1:5000");
    }
}
