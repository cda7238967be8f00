mod common;

use std::time::Duration;

use common::{assert_no_leaked_handlers, final_status, find_match, scu_with_idle, MockPeer, Step};
use dimse::operations::CMover;
use dimse::types::{
    DimseCommand, DimseResponse, DimseStatus, FindQuery, MoveQuery, QueryLevel, QueryRoot,
    RequestPayload, StoreObject, SubOperations,
};

#[tokio::test]
async fn find_identifiers_caps_at_max_results() {
    let peer = MockPeer::start("QR_SCP", |req| {
        let mut steps: Vec<Step> = (1..=5)
            .map(|n| find_match(req, "StudyInstanceUID", &format!("1.2.{}", n)))
            .collect();
        steps.push(final_status(req, DimseStatus::Success));
        steps
    })
    .await;
    let scu = scu_with_idle(Duration::from_secs(5));
    let finder = scu.finder(peer.node.clone());
    let mut message_id = 1;

    let identifiers = finder
        .find_identifiers(FindQuery::study(None).with_max_results(3), &mut message_id)
        .await
        .unwrap();

    assert_eq!(identifiers.len(), 3);
    assert_eq!(identifiers[0]["StudyInstanceUID"], "1.2.1");
    assert_eq!(identifiers[2]["StudyInstanceUID"], "1.2.3");
    assert_eq!(message_id, 3);
    assert_no_leaked_handlers(&scu);
}

#[tokio::test]
async fn find_with_patient_root_sends_query_keys() {
    let peer = MockPeer::start("QR_SCP", |req| {
        vec![
            find_match(req, "PatientName", "DOE^JANE"),
            final_status(req, DimseStatus::Success),
        ]
    })
    .await;
    let scu = scu_with_idle(Duration::from_secs(5));
    let finder = scu.finder(peer.node.clone()).with_root(QueryRoot::Patient);
    let mut message_id = 9;

    let responses = finder
        .find(
            FindQuery::patient(Some("PID-1".into())).with_parameter("PatientName", ""),
            &mut message_id,
        )
        .await
        .unwrap();
    assert_eq!(responses.len(), 2);

    let request = &peer.received()[0];
    assert_eq!(request.command, DimseCommand::Find);
    assert_eq!(request.message_id, 9);
    match &request.payload {
        RequestPayload::Find(query) => {
            assert_eq!(query.query_level, QueryLevel::Patient);
            assert_eq!(query.parameters.get("PatientName").map(String::as_str), Some(""));
        }
        other => panic!("expected C-FIND payload, got {:?}", other),
    }
}

#[tokio::test]
async fn find_failure_status_yields_no_identifiers() {
    let peer = MockPeer::start("QR_SCP", |req| {
        vec![final_status(req, DimseStatus::Failure(0xC000))]
    })
    .await;
    let scu = scu_with_idle(Duration::from_secs(5));
    let mut message_id = 1;

    let identifiers = scu
        .finder(peer.node.clone())
        .find_identifiers(FindQuery::study(None), &mut message_id)
        .await
        .unwrap();

    assert!(identifiers.is_empty());
}

#[tokio::test]
async fn move_reports_final_sub_operations() {
    let peer = MockPeer::start("QR_SCP", |req| {
        let progress = |remaining, completed| SubOperations {
            remaining,
            completed,
            ..Default::default()
        };
        vec![
            Step::Send(
                DimseResponse::new(req.message_id, DimseCommand::Move, DimseStatus::Pending)
                    .with_sub_operations(progress(2, 1)),
            ),
            Step::Send(
                DimseResponse::new(req.message_id, DimseCommand::Move, DimseStatus::Pending)
                    .with_sub_operations(progress(1, 2)),
            ),
            Step::Send(
                DimseResponse::new(req.message_id, DimseCommand::Move, DimseStatus::Success)
                    .with_sub_operations(progress(0, 3)),
            ),
        ]
    })
    .await;
    let scu = scu_with_idle(Duration::from_secs(5));
    let mut message_id = 1;

    let query = MoveQuery::new(QueryLevel::Study, "ARCHIVE").with_parameter("StudyInstanceUID", "1.2.3");
    let responses = scu
        .mover(peer.node.clone())
        .send_move(query, &mut message_id)
        .await
        .unwrap();

    assert_eq!(responses.len(), 3);
    let outcome = CMover::outcome(&responses).unwrap();
    assert_eq!(outcome.completed, 3);
    assert_eq!(outcome.remaining, 0);

    match &peer.received()[0].payload {
        RequestPayload::Move(query) => assert_eq!(query.destination_aet, "ARCHIVE"),
        other => panic!("expected C-MOVE payload, got {:?}", other),
    }
    assert_no_leaked_handlers(&scu);
}

#[tokio::test]
async fn store_returns_peer_status() {
    let peer = MockPeer::start("STORE_SCP", |req| vec![final_status(req, DimseStatus::Warning(0xB000))]).await;
    let scu = scu_with_idle(Duration::from_secs(5));
    let mut message_id = 5;

    let object = StoreObject {
        sop_class_uid: "1.2.840.10008.5.1.4.1.1.7".into(),
        sop_instance_uid: "1.2.3.4.5".into(),
        data: vec![0u8; 128],
    };
    let response = scu
        .storer(peer.node.clone())
        .store(object, &mut message_id)
        .await
        .unwrap()
        .expect("a response");

    assert_eq!(response.command, DimseCommand::Store);
    assert_eq!(response.status, DimseStatus::Warning(0xB000));
    assert!(response.status.is_final());
    assert_eq!(message_id, 7);

    let request = &peer.received()[0];
    assert_eq!(request.affected_sop_class_uid, "1.2.840.10008.5.1.4.1.1.7");
    match &request.payload {
        RequestPayload::Store(object) => assert_eq!(object.data.len(), 128),
        other => panic!("expected C-STORE payload, got {:?}", other),
    }
}
