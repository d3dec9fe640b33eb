use tickwork::channel::{Count, MAILBOX_LAYER, Mailboxes, Target};
use tickwork::runtime::LayerId;
use tickwork::task::{from_fn, poll_fn};
use tickwork::{Error, Runtime, Step, TaskId};

use std::cell::RefCell;
use std::rc::Rc;

fn id(raw: u64) -> TaskId {
    TaskId::from_raw(raw)
}

fn parked(rt: &Runtime) -> TaskId {
    rt.spawn(poll_fn(|_| Ok(Step::<()>::Yield)))
}

#[test]
fn test_send_and_receive() {
    let rt = Runtime::new();
    let boxes: Mailboxes<&str> = Mailboxes::install(&rt).unwrap();

    assert_eq!(boxes.open(Some(id(7))).unwrap(), id(7));
    assert_eq!(boxes.send("hi", id(7)).unwrap(), 1);

    assert_eq!(boxes.recv(id(7)).unwrap(), Some("hi"));
    assert_eq!(boxes.recv(id(7)).unwrap(), None, "Mailbox should now be empty");
    assert!(matches!(
        boxes.recv(id(99)),
        Err(Error::MailboxNotOpen(missing)) if missing == id(99)
    ));
}

#[test]
fn test_messages_are_fifo() {
    let rt = Runtime::new();
    let boxes: Mailboxes<u32> = Mailboxes::install(&rt).unwrap();
    boxes.open(Some(id(1))).unwrap();

    for n in 0..4 {
        boxes.send(n, id(1)).unwrap();
    }

    assert_eq!(boxes.len(id(1)), 4);
    assert_eq!(
        boxes.recv_up_to(id(1), Count::Unbounded).unwrap(),
        vec![0, 1, 2, 3]
    );
}

#[test]
fn test_broadcast_reaches_open_mailboxes_in_id_order() {
    let rt = Runtime::new();
    let boxes: Mailboxes<&str> = Mailboxes::install(&rt).unwrap();

    for raw in [5, 2, 9] {
        boxes.open(Some(id(raw))).unwrap();
    }

    assert_eq!(boxes.send("all", Target::All).unwrap(), 3);
    boxes.send("two", id(2)).unwrap();

    assert_eq!(
        boxes.recv_up_to(Target::All, Count::Unbounded).unwrap(),
        vec!["all", "two", "all", "all"],
        "Broadcast receive drains mailboxes in ascending id order"
    );
}

#[test]
fn test_multicast_skips_unopened_mailboxes() {
    let rt = Runtime::new();
    let boxes: Mailboxes<char> = Mailboxes::install(&rt).unwrap();
    boxes.open(Some(id(1))).unwrap();
    boxes.open(Some(id(3))).unwrap();

    let delivered = boxes.send('m', vec![id(3), id(2), id(1)]).unwrap();

    assert_eq!(delivered, 2);
    assert!(!boxes.is_open(id(2)), "Multicast never opens a mailbox");
    assert_eq!(
        boxes.recv(vec![id(2), id(1)]).unwrap(),
        Some('m'),
        "List receive skips unopened ids"
    );
}

#[test]
fn test_receive_limit_spans_targets() {
    let rt = Runtime::new();
    let boxes: Mailboxes<u8> = Mailboxes::install(&rt).unwrap();
    boxes.open(Some(id(1))).unwrap();
    boxes.open(Some(id(2))).unwrap();

    boxes.send(10, id(1)).unwrap();
    boxes.send(11, id(1)).unwrap();
    boxes.send(20, id(2)).unwrap();
    boxes.send(21, id(2)).unwrap();

    let taken = boxes
        .recv_up_to(vec![id(1), id(2)], Count::Limit(3))
        .unwrap();

    assert_eq!(taken, vec![10, 11, 20]);
    assert_eq!(boxes.len(id(2)), 1);
}

#[test]
fn test_unicast_opens_only_for_pending_tasks() {
    let rt = Runtime::new();
    let boxes: Mailboxes<&str> = Mailboxes::install(&rt).unwrap();
    let live = parked(&rt);

    assert_eq!(boxes.send("wake", live).unwrap(), 1);
    assert!(boxes.is_open(live), "A pending task gets a mailbox on first message");

    assert_eq!(boxes.send("lost", id(42)).unwrap(), 0);
    assert!(!boxes.is_open(id(42)), "Unknown tasks never get a mailbox");
}

#[test]
fn test_mailbox_closes_with_its_task() {
    let rt = Runtime::new();
    let boxes: Mailboxes<u8> = Mailboxes::install(&rt).unwrap();

    let cancelled = parked(&rt);
    let finished = rt.spawn(from_fn(|_| Ok(())));
    boxes.open(Some(cancelled)).unwrap();
    boxes.open(Some(finished)).unwrap();
    boxes.send(1, cancelled).unwrap();

    rt.cancel(cancelled);
    assert!(!boxes.is_open(cancelled), "Cancel should close the mailbox");

    rt.tick();
    assert!(!rt.contains(finished));
    assert!(!boxes.is_open(finished), "Completion should close the mailbox");
}

#[test]
fn test_one_mailbox_layer_per_runtime() {
    let rt = Runtime::new();
    let boxes: Mailboxes<u8> = Mailboxes::install(&rt).unwrap();

    let again = Mailboxes::<String>::install(&rt);
    assert!(matches!(again, Err(Error::LayerInstalled(_))));
    assert!(rt.is_layer_installed(&LayerId::from(MAILBOX_LAYER)));

    assert_eq!(boxes.uninstall(), 1);
    assert!(!rt.is_layer_installed(&LayerId::from(MAILBOX_LAYER)));

    let task = parked(&rt);
    boxes.open(Some(task)).unwrap();
    rt.cancel(task);
    assert!(
        boxes.is_open(task),
        "Without the layer mailboxes no longer follow their task"
    );

    assert!(Mailboxes::<String>::install(&rt).is_ok());
}

#[test]
fn test_current_target_inside_a_task() {
    let rt = Runtime::new();
    let boxes: Mailboxes<u32> = Mailboxes::install(&rt).unwrap();
    let received = Rc::new(RefCell::new(Vec::new()));

    let inbox = boxes.clone();
    let log = Rc::clone(&received);
    let task = rt.spawn(poll_fn(move |_| {
        if log.borrow().is_empty() {
            inbox.open(None)?;
            inbox.send(5, Target::Current)?;
        }
        if let Some(message) = inbox.recv(Target::Current)? {
            log.borrow_mut().push(message);
        }
        Ok(Step::<()>::Yield)
    }));

    rt.tick();

    assert!(boxes.is_open(task));
    assert_eq!(*received.borrow(), vec![5]);

    assert!(matches!(
        boxes.recv(Target::Current),
        Err(Error::NoCurrentTask)
    ));
    assert!(matches!(boxes.open(None), Err(Error::NoCurrentTask)));
}

#[test]
fn test_close_discards_messages() {
    let rt = Runtime::new();
    let boxes: Mailboxes<u8> = Mailboxes::install(&rt).unwrap();
    boxes.open(Some(id(3))).unwrap();
    boxes.send(1, id(3)).unwrap();

    assert!(boxes.close(Some(id(3))).unwrap());
    assert!(!boxes.close(Some(id(3))).unwrap(), "Already closed");
    assert_eq!(boxes.len(id(3)), 0);
}

#[test]
fn test_current_send_needs_an_open_mailbox() {
    let rt = Runtime::new();
    let boxes: Mailboxes<u32> = Mailboxes::install(&rt).unwrap();
    let delivered = Rc::new(RefCell::new(None));

    let inbox = boxes.clone();
    let slot = Rc::clone(&delivered);
    let task = rt.spawn(poll_fn(move |_| {
        if slot.borrow().is_none() {
            *slot.borrow_mut() = Some(inbox.send(5, Target::Current)?);
        }
        Ok(Step::<()>::Yield)
    }));

    rt.tick();

    assert_eq!(
        *delivered.borrow(),
        Some(0),
        "Sending to an unopened current mailbox should deliver nothing"
    );
    assert!(!boxes.is_open(task), "Sending should not open the caller's mailbox");
}
