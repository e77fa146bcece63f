// ABOUTME: Sandboxed execution of indexing jobs in docker containers or firecracker microVMs
// ABOUTME: Provides the host command executor, sandbox runners and the image archive cache

pub mod command;
pub mod error;
pub mod image_cache;
pub mod runner;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use command::{
    CommandRunner, HostCommand, HostCommandRunner, OutputSink, Program, StreamType, TracingSink,
};
pub use error::{CommandError, SandboxError, SandboxResult};
pub use image_cache::ImageCache;
pub use runner::{
    working_directory, CommandSpec, DockerRunner, FirecrackerOptions, FirecrackerRunner,
    ResourceOptions, Runner, DOCKER_MOUNT_PATH, FIRECRACKER_MOUNT_PATH,
};
