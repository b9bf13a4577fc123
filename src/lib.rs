/*!
 # Cassandra Harness

 A Rust library that brings a local Cassandra process up for integration
 tests, checks that it is really ready, and tears it down again.

 ## Overview

 The harness provides functionality to:
 - Launch the server with a controlled environment (config directory, include script)
 - Stream its merged stdout/stderr and watch for the readiness log line
 - Poll the Thrift port until it accepts connections, with linear backoff
 - Fail startup if the readiness line does not show up within a timeout
 - Kill the server on orderly teardown, on termination signals, or when the
   supervisor is dropped

 ## Basic Usage

 ```no_run
 use cassandra_harness::{HarnessConfig, ProcessSupervisor, Result};

 #[tokio::main]
 async fn main() -> Result<()> {
     let config = HarnessConfig::from_file("harness.json")?;
     let mut supervisor = ProcessSupervisor::new(config);

     // Blocks until the port accepts connections and the server logged readiness
     supervisor.start().await?;

     println!("Server ready at {}", supervisor.endpoint());

     // Idempotent; safe to call again from cleanup code
     supervisor.stop().await?;
     Ok(())
 }
 ```

 ## Features

 - **Readiness**: both a TCP probe and a log marker must confirm the server is up
 - **Cancellation**: startup can be interrupted through a cancellation token
 - **Kill-on-exit**: a process-wide hook kills the server if the host goes down
 - **Configuration**: JSON or YAML files, or built in code
 - **Collaborators**: connection-pool clearing and cluster-size waits plug in through traits

 ## License

 This project is licensed under the terms in the LICENSE file.
*/

pub mod client;
pub mod config;
pub mod error;
pub mod server;
mod supervisor;

pub use client::{ClientConfig, ClusterMembership, ConnectionPool};
pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use server::{Endpoint, SupervisorId, SupervisorState};
pub use supervisor::ProcessSupervisor;
