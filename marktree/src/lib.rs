//! Markdown documents as an addressable, revisioned tree
//!
//!     This crate turns markdown into a structured document tree and back, and exposes that tree
//!     to programmatic clients through a query and mutation protocol. A rich-text host and an
//!     automated client can work on the same document: the client reads the structure, proposes
//!     edits against a revision it has seen, and a human reviews what the client suggested.
//!
//!     This is a pure lib, that is, it powers marktree-cli but is shell agnostic: no code here
//!     prints, reads env vars or touches files. Logging goes through `tracing` and the caller
//!     decides whether anything listens.
//!
//! Architecture
//!
//!     .
//!     ├── tree                    # Node/mark model, positions, structural edits
//!     ├── formats
//!     │   ├── markdown            # comrak-based parser, hand-written serializer, style detection
//!     │   ├── json                # The tree itself as JSON
//!     │   └── treeviz             # Indented outline for debugging
//!     ├── format.rs / registry.rs # Format trait and discovery
//!     ├── cursor.rs               # Tree position <-> markdown offset mapping
//!     ├── ids.rs                  # Synthetic, per-traversal node IDs
//!     ├── revision.rs             # Optimistic concurrency tokens
//!     ├── query                   # getAst, listBlocks, resolveTargets, getSection, getDigest
//!     ├── mutation                # batchEdit, applyDiff, replaceAnchored, section/table/list ops
//!     ├── suggestion.rs           # Pending edits awaiting review
//!     ├── session.rs              # The single owner of one open document
//!     └── protocol                # Envelope, dispatch, limits
//!
//! Round trips
//!
//!     The markdown pipeline promises that parse, serialize, parse yields the same tree, and that
//!     serialize, parse, serialize yields the same text, for everything the tree can express.
//!     It does not promise byte-identical output for arbitrary input: a handful of equivalent
//!     spellings are normalized (setext headings become ATX, indented code becomes fenced and
//!     so on), and hard breaks and line endings follow the settings in
//!     [`formats::markdown::MarkdownOptions`].
//!
//! Addressing
//!
//!     Node IDs such as `h-0` or `p-3` are recomputed on every traversal and only mean something
//!     within one request/response round trip. Clients pair them with a revision: every mutation
//!     carries the `baseRevision` it was computed against, and a stale one is refused with a
//!     `conflict` instead of being merged.
//!
//! Testing
//!
//!     tests
//!     ├── lib.rs
//!     ├── markdown                # Round trips and normalizations
//!     ├── query
//!     ├── mutation
//!     └── protocol
//!
//!     Rust does not discover tests in subdirectories by itself, so tests/lib.rs includes them.

pub mod cursor;
pub mod error;
pub mod format;
pub mod formats;
pub mod ids;
pub mod mutation;
pub mod protocol;
pub mod query;
pub mod registry;
pub mod revision;
pub mod session;
pub mod suggestion;
pub mod tree;

pub use error::{ErrorCode, FormatError, ProtocolError};
pub use format::Format;
pub use formats::markdown::{MarkdownOptions, SerializeOptions};
pub use protocol::{Dispatcher, Limits};
pub use registry::FormatRegistry;
pub use revision::Revision;
pub use session::{DocumentSession, SessionSettings};
pub use tree::{Mark, MarkType, Node, NodeType};
