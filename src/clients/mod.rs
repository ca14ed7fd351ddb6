pub mod collab_client;

pub use collab_client::CollabClient;
