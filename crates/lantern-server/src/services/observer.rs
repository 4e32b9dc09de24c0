//! Observer service: switches change observation on and off.

use crate::call::UnaryHandler;
use crate::context::HostContext;
use crate::protocol::Status;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct NoParams {}

#[derive(Debug, Serialize)]
pub struct ObservingResult {
    pub observing: bool,
}

#[derive(Default)]
pub struct StartObserver;

impl UnaryHandler for StartObserver {
    const METHOD: &'static str = "observer.start";
    type Context = HostContext;
    type Request = NoParams;
    type Response = ObservingResult;

    fn process(&self, cx: &mut HostContext, _: NoParams) -> Result<ObservingResult, Status> {
        if !cx.observers.enable(cx.graph.as_ref(), &cx.searcher) {
            return Err(Status::invalid_argument("observer is already running"));
        }
        Ok(ObservingResult { observing: true })
    }
}

#[derive(Default)]
pub struct StopObserver;

impl UnaryHandler for StopObserver {
    const METHOD: &'static str = "observer.stop";
    type Context = HostContext;
    type Request = NoParams;
    type Response = ObservingResult;

    fn process(&self, cx: &mut HostContext, _: NoParams) -> Result<ObservingResult, Status> {
        if !cx.observers.disable() {
            return Err(Status::invalid_argument("observer is not running"));
        }
        Ok(ObservingResult { observing: false })
    }
}
