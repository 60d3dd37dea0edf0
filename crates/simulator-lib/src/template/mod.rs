//! Node template synthesis
//!
//! Provides:
//! - [`TemplateSynthesizer`]: per-group templates from live nodes, the
//!   template cache or the cloud provider
//! - Sanitization of node identity for templates
//! - Provider-specific suppression of duplicated daemon pods

mod sanitize;
mod suppressor;
mod synthesizer;


pub use sanitize::{sanitize_node_info, sanitize_template_node, LABEL_HOSTNAME};
pub use suppressor::{
    effective_node_pods, suppressor_for_provider, DuplicatePodSuppressor,
    KubeProxyMirrorSuppressor, NoopSuppressor,
};
pub use synthesizer::{pods_for_nodes, TemplateSynthesizer, TemplateSynthesizerBuilder};
