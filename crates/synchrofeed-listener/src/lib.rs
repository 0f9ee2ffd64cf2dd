// synchrofeed-listener: drains the feed event queue and dispatches the
// configured actions. Depends on `synchrofeed-sdk` and `synchrofeed-common`.
//
// Architecture:
//   main → Application::execute_command → run / check / help / version
//   ListenerService::start → QueueResolver (once) → queue-listener thread
//   MessageListener (poll) → MessageProcessor (per message) → ActionProcessor

pub mod application;
pub mod builtin_actions;
pub mod command_settings;
pub mod feed_event;
pub mod listener_service;
pub mod message_listener;
pub mod message_processor;
pub mod queue_client;

#[cfg(test)]
pub(crate) mod test_support;
