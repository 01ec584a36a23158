// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all scheduling errors that cross the crate boundary. The
//! scheduling core itself recovers locally (dropped stations, baselines or
//! scans) and reports through the log stream; only setup problems surface
//! here.

use thiserror::Error;

use crate::multisched::MultiSchedError;
use crate::time::TimeError;

#[derive(Error, Debug)]
pub enum SkedError {
    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    MultiSched(#[from] MultiSchedError),
}
