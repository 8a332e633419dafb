mod local_rename;
mod session_scenarios;
