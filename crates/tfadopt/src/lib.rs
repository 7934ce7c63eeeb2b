//! # tfadopt - adopt a running CDN service into terraform
//!
//! Imports an existing Fastly VCL service and everything hanging off it into a terraform state and produces
//! configuration that matches the state, so the first `terraform plan` after the migration shows no changes.
//!
//! ## Introduction for developers
//!
//! ### HCL Terms
//!
//! In hcl terms...
//! - a file gets parsed as a `body`
//! - ...which is just a list of `structures`
//! - ...where there are two kinds:
//!   - `attribute`: a "key = value" pair
//!   - or `block`:
//!     - 1 `identifier`
//!     - followed by 0 or more `labels`
//!     - and a `body` enclosed in `{` and `}`
//!
//! `terraform show` prints the state as a body of `resource "<type>" "<name>" { ... }` blocks. The service resource
//! holds one nested block per backend, snippet, logging endpoint and so on:
//!
//! ```hcl
//! resource "fastly_service_vcl" "service" {
//!     id   = "1a2b3c"
//!     name = "www.example.com"
//!
//!     acl {
//!         acl_id = "4d5e6f"
//!         name   = "Blocked IPs"
//!     }
//! }
//! ```
//!
//! ### Classifying
//!
//! see [classify::classify]
//!
//! The dump of the freshly imported service is walked once. Every nested block produces a [prop::Prop], blocks the
//! migration does not care about produce a placeholder. Props of ACLs, dictionaries, the WAF and dynamic snippets name
//! the separate resources that have to be imported next.
//!
//! ### Rewriting
//!
//! see [rewrite::Rewriter::rewrite]
//!
//! After everything is imported the state is dumped again and the dump is re-parsed. Its nested blocks are matched to
//! the props by position, which is why the classifier emits a prop for every block. The rewrite
//!
//! - removes computed attributes terraform would refuse or show as changes
//! - moves scripts and log formats to files ([externalize]) and references them via `file(...)`
//! - restores secrets that the dump masks, from the state or an [artifacts::ArtifactSource]
//! - replaces ids in dependent resources with references to the service
//!
//! ### State patching
//!
//! see [state::StateDocument]
//!
//! Attributes that only exist in configuration (`activate`, `manage_*`) are set in the state with small
//! [jq](https://jqlang.github.io/jq/)-like queries ([state::query]).
//!
//! ### Putting it together
//!
//! see [pipeline::import_service]
//!
pub mod artifacts;
pub mod classify;
pub mod document;
pub mod externalize;
pub mod pipeline;
pub mod prop;
pub mod rewrite;
pub mod secrets;
pub mod state;
pub mod terraform;
