//! Integration tests exercising complete round flows across the server
//! components and the wire protocol, without spinning up full processes.

use server::announcer::{self, Announcer};
use server::directory::PlayerDirectory;
use server::judge::Outcome;
use server::rooms::{AssignOutcome, RoomRegistry};
use shared::protocol::{read_frame, write_frame, Message};
use shared::{Move, PlayerSlot};

/// Drives one full round through registry, directory and judge the way the
/// server does: assign two players, attach their room connections, submit
/// both moves, then judge, credit the winner and recycle the room.
fn play_round(
    registry: &mut RoomRegistry,
    directory: &mut PlayerDirectory,
    room_number: u32,
    players: [(u32, &str, Option<Move>); 2],
) -> String {
    let index = (room_number - 1) as usize;

    for (conn, name, _) in &players {
        directory.register(*conn, name);
        assert!(matches!(
            registry.assign(room_number, *conn),
            AssignOutcome::Redirect(_)
        ));
    }

    let room = registry.room_mut(index).unwrap();
    let slot_base = 100;
    assert_eq!(room.attach(slot_base), Some(PlayerSlot::A));
    assert_eq!(room.attach(slot_base + 1), Some(PlayerSlot::B));

    assert!(!room.submit(PlayerSlot::A, players[0].2));
    assert!(room.submit(PlayerSlot::B, players[1].2));

    let outcome = room.outcome().unwrap();
    let assigned = room.assigned().to_vec();
    let winner_conn = match outcome {
        Outcome::Draw => None,
        Outcome::PlayerA => Some(assigned[0]),
        Outcome::PlayerB => Some(assigned[1]),
    };
    let winner_name = winner_conn
        .and_then(|conn| directory.name_of(conn))
        .map(str::to_string);
    if let Some(name) = &winner_name {
        directory.record_win(name);
    }

    let text = announcer::result_text(room_number, winner_name.as_deref());

    let cleared = registry.room_mut(index).unwrap().reset();
    assert_eq!(cleared.assigned, assigned);

    text
}

mod round_flow {
    use super::*;

    #[test]
    fn test_decisive_round_names_the_winner() {
        let mut registry = RoomRegistry::new(8080, 3).unwrap();
        let mut directory = PlayerDirectory::new();

        let text = play_round(
            &mut registry,
            &mut directory,
            1,
            [(1, "Ann", Some(Move::Rock)), (2, "Bob", Some(Move::Scissors))],
        );

        assert_eq!(text, "Player Ann in the room 1 won the game!");
        assert_eq!(directory.wins("Ann"), 1);
        assert_eq!(directory.wins("Bob"), 0);
    }

    #[test]
    fn test_tied_round_credits_nobody() {
        let mut registry = RoomRegistry::new(8080, 3).unwrap();
        let mut directory = PlayerDirectory::new();

        let text = play_round(
            &mut registry,
            &mut directory,
            2,
            [(1, "Ann", Some(Move::Paper)), (2, "Bob", Some(Move::Paper))],
        );

        assert_eq!(text, "The game in the room 2 was a tie!");
        assert_eq!(directory.wins("Ann"), 0);
        assert_eq!(directory.wins("Bob"), 0);
    }

    #[test]
    fn test_timed_out_player_forfeits() {
        let mut registry = RoomRegistry::new(8080, 3).unwrap();
        let mut directory = PlayerDirectory::new();

        let text = play_round(
            &mut registry,
            &mut directory,
            1,
            [(1, "Ann", Some(Move::Rock)), (2, "Bob", None)],
        );

        assert_eq!(text, "Player Ann in the room 1 won the game!");
        assert_eq!(directory.wins("Ann"), 1);
    }

    #[test]
    fn test_double_timeout_is_a_tie() {
        let mut registry = RoomRegistry::new(8080, 1).unwrap();
        let mut directory = PlayerDirectory::new();

        let text = play_round(
            &mut registry,
            &mut directory,
            1,
            [(1, "Ann", None), (2, "Bob", None)],
        );

        assert_eq!(text, "The game in the room 1 was a tie!");
        assert_eq!(directory.wins("Ann"), 0);
        assert_eq!(directory.wins("Bob"), 0);
    }

    #[test]
    fn test_room_is_reusable_after_each_round() {
        let mut registry = RoomRegistry::new(8080, 1).unwrap();
        let mut directory = PlayerDirectory::new();

        play_round(
            &mut registry,
            &mut directory,
            1,
            [(1, "Ann", Some(Move::Rock)), (2, "Bob", Some(Move::Scissors))],
        );
        // Same pair rematches in the freshly recycled room; the loss goes
        // the other way this time.
        let text = play_round(
            &mut registry,
            &mut directory,
            1,
            [(1, "Ann", Some(Move::Rock)), (2, "Bob", Some(Move::Paper))],
        );

        assert_eq!(text, "Player Bob in the room 1 won the game!");
        assert_eq!(directory.wins("Ann"), 1);
        assert_eq!(directory.wins("Bob"), 1);
    }

    #[test]
    fn test_win_counts_accumulate_into_standings() {
        let mut registry = RoomRegistry::new(8080, 1).unwrap();
        let mut directory = PlayerDirectory::new();

        for _ in 0..2 {
            play_round(
                &mut registry,
                &mut directory,
                1,
                [(1, "Ann", Some(Move::Rock)), (2, "Bob", Some(Move::Scissors))],
            );
        }

        assert_eq!(directory.standings_text(), "Ann: 2\nBob: 0\n");
    }
}

mod matchmaking {
    use super::*;

    #[test]
    fn test_full_room_disappears_from_listing_until_recycled() {
        let mut registry = RoomRegistry::new(8080, 2).unwrap();

        assert_eq!(registry.assign(1, 1), AssignOutcome::Redirect(8081));
        assert_eq!(registry.assign(1, 2), AssignOutcome::Redirect(8081));
        assert_eq!(registry.open_rooms_text(), "\nRoom 2\n");
        assert_eq!(registry.assign(1, 3), AssignOutcome::Unavailable);

        registry.room_mut(0).unwrap().reset();
        assert_eq!(registry.open_rooms_text(), "\nRoom 1\nRoom 2\n");
        assert_eq!(registry.assign(1, 3), AssignOutcome::Redirect(8081));
    }

    #[test]
    fn test_mid_round_departure_resets_instead_of_backfilling() {
        let mut registry = RoomRegistry::new(8080, 1).unwrap();
        let mut directory = PlayerDirectory::new();
        directory.register(1, "Ann");
        directory.register(2, "Bob");
        registry.assign(1, 1);
        registry.assign(1, 2);

        let room = registry.room_mut(0).unwrap();
        room.attach(20);
        room.attach(21);

        // Ann's lobby connection drops after both slots attached. With the
        // round underway the whole pairing is voided, never just her
        // reservation: a backfilled third player must start a fresh round,
        // not inherit slot A's standing in this one.
        assert!(room.round_underway());
        let cleared = room.reset();
        assert_eq!(cleared.assigned, vec![1, 2]);
        assert_eq!(cleared.slot_conns, vec![20, 21]);

        directory.register(3, "Eve");
        assert_eq!(registry.assign(1, 3), AssignOutcome::Redirect(8081));
        assert_eq!(registry.room(0).unwrap().assigned(), &[3]);
        assert!(!registry.room(0).unwrap().round_underway());
    }

    #[test]
    fn test_departing_player_releases_the_reservation() {
        let mut registry = RoomRegistry::new(8080, 1).unwrap();
        registry.assign(1, 1);
        registry.assign(1, 2);

        assert_eq!(registry.find_assigned(2), Some(0));
        registry.room_mut(0).unwrap().unassign(2);
        assert_eq!(registry.find_assigned(2), None);
        assert_eq!(registry.assign(1, 3), AssignOutcome::Redirect(8081));
    }
}

mod terminal_input {
    use super::*;
    use client::input::{parse_move, parse_room_number};

    #[test]
    fn test_typed_menu_digit_becomes_a_wire_move() {
        let mv = parse_move("2\n");
        let message = Message::MoveSubmit {
            room: 1,
            slot: PlayerSlot::A,
            mv,
        };
        assert_eq!(message.encode(), "*move-submit*1*1*2");
    }

    #[test]
    fn test_no_input_becomes_the_timeout_default() {
        // An empty or garbled line stages nothing; the deadline then sends
        // move code 0 and the judge treats it as a forfeit.
        for line in ["", "rock", "9"] {
            let message = Message::MoveSubmit {
                room: 2,
                slot: PlayerSlot::B,
                mv: parse_move(line),
            };
            assert_eq!(message.encode(), "*move-submit*2*2*0");
        }
    }

    #[test]
    fn test_room_choice_parsing_feeds_the_lobby() {
        assert_eq!(
            parse_room_number(" 3\n").map(Message::RoomChoice),
            Some(Message::RoomChoice(3))
        );
        assert_eq!(parse_room_number("lobby"), None);
    }
}

mod wire {
    use super::*;
    use tokio::net::{TcpListener, TcpStream, UdpSocket};

    #[tokio::test]
    async fn test_frames_survive_a_real_tcp_hop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            write_frame(&mut stream, &Message::NameSubmit("Ann".into()))
                .await
                .unwrap();
            write_frame(
                &mut stream,
                &Message::MoveSubmit {
                    room: 1,
                    slot: PlayerSlot::B,
                    mv: Some(Move::Paper),
                },
            )
            .await
            .unwrap();
        });

        let (mut stream, _) = listener.accept().await.unwrap();
        let first = read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(Message::decode(&first).unwrap(), Message::NameSubmit("Ann".into()));

        let second = read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(
            Message::decode(&second).unwrap(),
            Message::MoveSubmit {
                room: 1,
                slot: PlayerSlot::B,
                mv: Some(Move::Paper),
            }
        );

        // Orderly shutdown reads as end of stream, not an error.
        client.await.unwrap();
        assert_eq!(read_frame(&mut stream).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_round_result_reaches_a_udp_listener() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();

        let sender = std::sync::Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let announcer = Announcer::new(sender, target);

        let text = announcer::result_text(1, Some("Ann"));
        announcer.round_result(&text).await;

        let mut buffer = [0u8; 2048];
        let (len, _) = receiver.recv_from(&mut buffer).await.unwrap();
        let body = std::str::from_utf8(&buffer[..len]).unwrap();
        assert_eq!(
            Message::decode(body).unwrap(),
            Message::RoundResult("Player Ann in the room 1 won the game!".into())
        );
    }

    #[tokio::test]
    async fn test_final_standings_reach_a_udp_listener() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();

        let sender = std::sync::Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let announcer = Announcer::new(sender, target);

        let mut directory = PlayerDirectory::new();
        directory.register(1, "Ann");
        directory.register(2, "Bob");
        directory.record_win("Ann");
        announcer
            .final_standings(format!(
                "The game ended. Here is the list of players and win counts:\n{}",
                directory.standings_text()
            ))
            .await;

        let mut buffer = [0u8; 2048];
        let (len, _) = receiver.recv_from(&mut buffer).await.unwrap();
        let body = std::str::from_utf8(&buffer[..len]).unwrap();
        match Message::decode(body).unwrap() {
            Message::FinalStandings(text) => {
                assert!(text.starts_with("The game ended."));
                assert!(text.contains("Ann: 1\n"));
                assert!(text.contains("Bob: 0\n"));
            }
            other => panic!("unexpected broadcast {}", other.opcode()),
        }
    }
}
