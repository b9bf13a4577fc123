// Runs in its own test binary: firing the process-wide hooks would otherwise
// kill servers owned by concurrently running tests.

use cassandra_harness::server::shutdown::{registered_hooks, run_exit_hooks};
use cassandra_harness::server::{ShutdownCoordinator, SupervisedProcess};
use std::collections::BTreeMap;

#[tokio::test]
async fn test_exit_hooks_kill_every_registered_process_once() {
    let args = vec!["30".to_string()];
    let mut first = SupervisedProcess::spawn("sleep", &args, BTreeMap::new()).unwrap();
    let mut second = SupervisedProcess::spawn("sleep", &args, BTreeMap::new()).unwrap();

    let mut first_hook = ShutdownCoordinator::new();
    let mut second_hook = ShutdownCoordinator::new();
    first_hook.register_kill_on_exit(first.killer(), "first");
    second_hook.register_kill_on_exit(second.killer(), "second");
    assert_eq!(registered_hooks(), 2);

    assert_eq!(run_exit_hooks(), 2);
    assert_eq!(run_exit_hooks(), 0);

    assert!(!first.kill_and_wait().await.unwrap().unwrap().success());
    assert!(!second.kill_and_wait().await.unwrap().unwrap().success());

    first_hook.deregister();
    second_hook.deregister();
    assert_eq!(registered_hooks(), 0);
}
