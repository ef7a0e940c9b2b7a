/// Kubernetes Events for Dogu resources.
pub mod event_helper;
