mod events;
mod performance;
mod reads;
mod stream;
mod tokens;

pub(crate) use events::{cancel_session, post_event};
pub(crate) use performance::{performance_queue, performance_times};
pub(crate) use reads::{get_observations, get_prompts, get_recent_queue, get_summaries, health};
pub(crate) use stream::sse_stream;
pub(crate) use tokens::{
    tokens_by_project, tokens_by_type, tokens_compression, tokens_projection, tokens_summary,
    tokens_time_series,
};
