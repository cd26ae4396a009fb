mod test_orchestrator;
mod test_server;
