mod support;
mod test_client;
mod test_consumer;
mod test_lifecycle;
mod test_server;
