use crate::alerts::{AlertDispatcher, AlertEvaluator};
use crate::events::EventSink;
use crate::signals::MetricParams;
use crate::timeseries::TimeSeriesBuilder;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub builder: Arc<TimeSeriesBuilder>,
    pub evaluator: Arc<AlertEvaluator>,
    pub dispatcher: AlertDispatcher,
    pub events: EventSink,
    /// Window sizes used when a metrics query does not override them.
    pub params: MetricParams,
}
