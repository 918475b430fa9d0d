//! # tlspeek-core
//!
//! Resolves `pthread_getspecific(key)` for a thread that is not ours to
//! run code in. The value is derived from the thread's saved TLS base and a
//! fixed, short chain of bounded reads whose shape depends on which C
//! library the target links (glibc or musl) and on the CPU architecture.
//!
//! Memory and register access are injected through
//! [`tlspeek_membrane::MemoryReader`] and [`tlspeek_membrane::TaskView`];
//! nothing in this crate dereferences a target address directly, and no
//! state survives a call.

#![deny(unsafe_code)]

pub mod abi;
pub mod descriptor;
pub mod error;
pub mod glibc;
pub mod musl;
pub mod registers;
pub mod resolver;
pub mod trace;

pub use descriptor::{LibcVariant, LibraryDescriptor, TlsKey};
pub use error::{ErrorKind, ReadSite, ResolveError};
pub use registers::ThreadRegisterState;
pub use resolver::{TlsResolver, pthread_getspecific_remote};
pub use trace::{MemorySink, NullSink, StderrSink, TraceFilter, TraceLevel, TraceRecord, TraceSink, Tracer};
pub use tlspeek_membrane::Arch;
