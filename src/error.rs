// BSD 2-Clause License
//
// Copyright (c) 2021, 2022 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::error::Error;
use std::fmt;

/// Errors raised while evaluating a single path, or (for
/// [ExecError::InconsistentReturnVariable]) while combining the results
/// of a function's paths. None of these abort the process: path-level
/// errors fail only the path that raised them, and are reported
/// alongside the successful paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecError {
    /// The path enumerator produced something the interpreter cannot
    /// replay. Not expected for any well-formed control-flow graph.
    Enumeration(String),
    /// An instruction class the interpreter does not model (calls, phi
    /// nodes, floating point, vectors, atomics, and friends), or a
    /// modelled instruction used in an unsupported way.
    UnsupportedInstruction(String),
    /// An operand referenced an instruction result that was never
    /// computed on this path. Values that cross cutpoint boundaries must
    /// flow through memory.
    UnboundLocal(usize),
    /// A pointer did not resolve to exactly one live allocation.
    ResolutionFailure(String),
    /// A memory access is not provably inside its object.
    BoundsViolation { object: String, width_bytes: u64 },
    /// The solver could not answer a required query within its budget.
    SolverTimeout(&'static str),
    /// A store targeted a read-only object.
    ReadOnlyViolation(String),
    /// Two paths of the same function disagree about which variable
    /// backs the return value.
    InconsistentReturnVariable { first: String, second: String },
    /// The watchdog asked for evaluation to stop.
    Cancelled,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ExecError::*;
        match self {
            Enumeration(msg) => write!(f, "path enumeration error: {}", msg),
            UnsupportedInstruction(what) => write!(f, "unsupported instruction: {}", what),
            UnboundLocal(instr) => {
                write!(f, "instruction result %{} is not defined on this path", instr)
            }
            ResolutionFailure(msg) => write!(f, "pointer does not resolve to a unique object: {}", msg),
            BoundsViolation { object, width_bytes } => {
                write!(f, "{}-byte access not provably within object {}", width_bytes, object)
            }
            SolverTimeout(query) => write!(f, "solver timed out ({})", query),
            ReadOnlyViolation(object) => write!(f, "write to read-only object {}", object),
            InconsistentReturnVariable { first, second } => {
                write!(f, "paths disagree on the return variable: {} vs {}", first, second)
            }
            Cancelled => write!(f, "evaluation cancelled"),
        }
    }
}

impl Error for ExecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
