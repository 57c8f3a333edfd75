// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Canonical value encoding for transport and lineage recording.
//!
//! Every input and output payload passes through this module on its way to a
//! platform driver or the lineage graph. Common values map onto plain JSON;
//! everything else travels in a tagged envelope keyed by `__type__` so the
//! receiving side can reconstruct it, or at worst hold onto it unchanged.
//!
//! Two properties matter here:
//!
//! * **Round trip**: `decode(encode(v)) == v` for every supported type.
//! * **Determinism**: equal values encode to byte-identical JSON text when
//!   emitted with sorted keys. The execution hash depends on this.
//!
//! Encoding never fails; values with no envelope degrade to a `repr`
//! envelope carrying a textual representation. Decoding an unknown
//! `__type__` returns the envelope unchanged so newer peers can speak to
//! older ones.

mod hash;
mod value;

pub use hash::{content_hash, execution_hash};
pub use value::{canonical_string, decode, encode, Value};
