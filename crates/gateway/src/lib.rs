pub mod argocd;
pub mod broker;
pub mod config;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod tekton;
pub mod upstream;
