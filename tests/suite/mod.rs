mod cancellation;
mod pipeline;
mod probe;
