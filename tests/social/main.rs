//! Integration tests for the social data layer over an in-memory network.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use socialdrive::social::{
    CommentFilter, CountOpts, FollowFilter, FollowListOpts, ListOpts, NewComment, NewLinkPost,
    PostFilter, PostKind, TabulateOpts, ThreadOpts, VoteFilter,
};
use socialdrive::store::{Drive, Manifest, WriteOpts};
use socialdrive::Error;
use support::World;

// ---------------------------------------------------------------------------
// Follows
// ---------------------------------------------------------------------------

#[test]
fn follow_add_is_idempotent() {
    let world = World::new();
    let bob = world.peer("Bob");

    let first = world.ctx.follows().add(&bob.key.url(), "Bob").unwrap();
    let second = world.ctx.follows().add(&bob.key.url(), "Bob again").unwrap();
    assert_eq!(first, "bob");
    assert_eq!(first, second);

    let relations = world
        .ctx
        .follows()
        .list(&FollowFilter::by_author(world.user.clone()), &FollowListOpts::default())
        .unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].target, bob.key);
    assert_eq!(relations[0].author, world.user);
}

#[test]
fn follow_names_are_unique_per_title() {
    let world = World::new();
    let bob = world.peer("Bob");
    let other_bob = world.peer("Bob");

    assert_eq!(world.ctx.follows().add(&bob.key.url(), "Bob").unwrap(), "bob");
    assert_eq!(
        world.ctx.follows().add(&other_bob.key.url(), "Bob").unwrap(),
        "bob-2"
    );
}

#[test]
fn follow_resolves_registered_names() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.network.register_name("bob.example", &bob.key).unwrap();

    world.ctx.follows().add("bob.example", "Bob").unwrap();
    let graph = world.ctx.follows().graph(&world.user).unwrap();
    assert_eq!(graph, vec![bob.key.clone()]);

    let err = world.ctx.follows().add("nobody.example", "x").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn follow_remove_by_url_or_name() {
    let world = World::new();
    let bob = world.peer("Bob");
    let carol = world.peer("Carol");
    world.follow(&bob);
    world.follow(&carol);

    assert_eq!(world.ctx.follows().remove(&bob.key.url()).unwrap(), 1);
    assert_eq!(world.ctx.follows().remove("carol").unwrap(), 1);
    assert_eq!(world.ctx.follows().remove("carol").unwrap(), 0);
    assert!(world.ctx.follows().graph(&world.user).unwrap().is_empty());
}

#[test]
fn list_without_author_covers_second_degree() {
    let world = World::new();
    let bob = world.peer("Bob");
    let carol = world.peer("Carol");
    world.follow(&bob);
    bob.follow("carol", &carol.key);
    bob.follow("carol-again", &carol.key);
    bob.follow("me", &world.user);

    let all = world
        .ctx
        .follows()
        .list(&FollowFilter::default(), &FollowListOpts::default())
        .unwrap();
    assert_eq!(all.len(), 4);

    let deduped = world
        .ctx
        .follows()
        .list(
            &FollowFilter::default(),
            &FollowListOpts {
                remove_duplicate_mounts: true,
                include_profiles: true,
            },
        )
        .unwrap();
    assert_eq!(deduped.len(), 3);
    assert!(deduped
        .iter()
        .all(|r| r.author_profile.is_some() && r.target_profile.is_some()));

    let graph = world.ctx.follows().graph(&world.user).unwrap();
    assert_eq!(graph, vec![bob.key.clone(), carol.key.clone()]);
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[test]
fn profile_is_cached_per_drive() {
    let world = World::new();
    let first = world.ctx.profiles().user().unwrap();
    let second = world.ctx.profiles().get(&world.user).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.title, "Local User");
    assert_eq!(first.description, "me");
    assert_eq!(first.url, world.user.url());
}

#[test]
fn clear_caches_refetches_profiles() {
    let world = World::new();
    let bob = world.peer("Bob");
    let profiles = world.ctx.profiles();
    assert!(profiles.get(&bob.key).unwrap().thumbnail.is_none());

    bob.drive
        .write_file("/thumb.png", "", &WriteOpts::default())
        .unwrap();
    assert!(profiles.get(&bob.key).unwrap().thumbnail.is_none());

    world.ctx.clear_caches();
    assert_eq!(
        profiles.get(&bob.key).unwrap().thumbnail,
        Some(bob.key.join("/thumb.png"))
    );
}

#[test]
fn profile_graph_flags_mutual_follows() {
    let world = World::new();
    let bob = world.peer("Bob");
    let carol = world.peer("Carol");
    world.follow(&bob);
    bob.follow("me", &world.user);
    bob.follow("carol", &carol.key);

    let profile = world.ctx.profiles().get_with_graph(&bob.key).unwrap();
    assert_eq!(profile.title, "Bob");
    assert_eq!(profile.is_following_user, Some(true));
    assert_eq!(profile.is_user_following, Some(true));
    assert_eq!(
        profile.following,
        Some(vec![carol.key.clone(), world.user.clone()])
    );
    assert_eq!(profile.followers, Some(vec![world.user.clone()]));

    let carol_profile = world.ctx.profiles().get_with_graph(&carol.key).unwrap();
    assert_eq!(carol_profile.is_following_user, Some(false));
    assert_eq!(carol_profile.is_user_following, Some(false));
    assert_eq!(carol_profile.followers, Some(vec![bob.key.clone()]));
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[test]
fn text_posts_round_trip_through_list_and_get() {
    let world = World::new();
    let url = world
        .ctx
        .posts()
        .add_text_post(" News ", "Hello", "first post")
        .unwrap();
    assert!(world.user.owns(&url));

    let posts = world
        .ctx
        .posts()
        .list(
            &PostFilter {
                author: Some(world.user.clone()),
                topic: Some("news".into()),
            },
            &ListOpts::default(),
        )
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, url);
    assert_eq!(posts[0].topic, "news");
    assert_eq!(posts[0].kind, PostKind::Text);
    assert_eq!(posts[0].content.as_deref(), Some("first post"));

    let fetched = world.ctx.posts().get(&url).unwrap().unwrap();
    assert_eq!(fetched.title, "Hello");
}

#[test]
fn link_posts_normalize_topic_and_url() {
    let world = World::new();
    let url = world
        .ctx
        .posts()
        .add_link(&NewLinkPost {
            topic: "Rust Lang".into(),
            title: "Crates".into(),
            href: "crates.io".into(),
            drive_type: Some("website".into()),
        })
        .unwrap();
    assert!(url.ends_with(".goto"));

    let post = world.ctx.posts().get(&url).unwrap().unwrap();
    assert_eq!(post.kind, PostKind::Link);
    assert_eq!(post.topic, "rust-lang");
    assert_eq!(post.href.as_deref(), Some("https://crates.io"));
    assert_eq!(post.drive_type.as_deref(), Some("website"));
    assert!(post.content.is_none());
}

#[test]
fn post_writes_validate_their_inputs() {
    let world = World::new();
    let posts = world.ctx.posts();

    let missing_title = posts.add_text_post("news", "  ", "body").unwrap_err();
    assert!(matches!(missing_title, Error::Validation(_)));

    let missing_body = posts.add_text_post("news", "Title", "").unwrap_err();
    assert!(matches!(missing_body, Error::Validation(_)));

    let bad_topic = posts.add_text_post("!!", "Title", "body").unwrap_err();
    assert!(matches!(bad_topic, Error::Validation(_)));

    let bad_href = posts
        .add_link(&NewLinkPost {
            topic: "news".into(),
            title: "Title".into(),
            href: "not a url".into(),
            drive_type: None,
        })
        .unwrap_err();
    assert!(matches!(bad_href, Error::Validation(_)));

    let text_as_file = posts.add_file("news", "Title", "md", "aGVsbG8=").unwrap_err();
    assert!(matches!(text_as_file, Error::Validation(_)));
}

#[test]
fn file_posts_are_stored_as_binary() {
    let world = World::new();
    let url = world
        .ctx
        .posts()
        .add_file("pics", "Cat", ".png", "aGVsbG8=")
        .unwrap();

    let post = world.ctx.posts().get(&url).unwrap().unwrap();
    assert_eq!(post.kind, PostKind::File);
    assert!(post.content.is_none());
    assert!(post.is_valid());
}

#[test]
fn listing_merges_followed_posts_and_drops_invalid_ones() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);

    world.ctx.posts().add_text_post("news", "Mine", "hello").unwrap();
    bob.post("news", 10, "Bob's", "hi");
    bob.post("news", 11, "", "no title");
    bob.post("news", 12, "No body", "   ");
    bob.post("other", 13, "Elsewhere", "x");

    let news = world
        .ctx
        .posts()
        .list(
            &PostFilter {
                author: None,
                topic: Some("news".into()),
            },
            &ListOpts::default(),
        )
        .unwrap();
    let titles: Vec<&str> = news.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Bob's", "Mine"]);

    let everything = world
        .ctx
        .posts()
        .list(&PostFilter::default(), &ListOpts::default().page(1, 5))
        .unwrap();
    assert_eq!(everything.len(), 2);
}

#[test]
fn only_own_posts_can_be_removed() {
    let world = World::new();
    let bob = world.peer("Bob");
    let mine = world.ctx.posts().add_text_post("news", "Mine", "hello").unwrap();
    let theirs = bob.post("news", 10, "Bob's", "hi");

    let err = world.ctx.posts().remove(&theirs).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    world.ctx.posts().remove(&mine).unwrap();
    assert!(world.ctx.posts().get(&mine).unwrap().is_none());
}

#[test]
fn unreachable_peers_degrade_to_empty_results() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    bob.post("news", 10, "Bob's", "hi");
    world.ctx.posts().add_text_post("news", "Mine", "hello").unwrap();
    world.network.set_unreachable(&bob.key, true).unwrap();

    let posts = world
        .ctx
        .posts()
        .list(&PostFilter::default(), &ListOpts::default())
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Mine");

    let bob_only = world
        .ctx
        .posts()
        .list(
            &PostFilter {
                author: Some(bob.key.clone()),
                topic: None,
            },
            &ListOpts::default(),
        )
        .unwrap();
    assert!(bob_only.is_empty());
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[test]
fn comments_thread_into_reply_trees() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let href = world.user_post_url(1);

    let a = bob.comment(100, &href, None, "A");
    let b = bob.comment(101, &href, Some(&a), "B");
    let c = bob.comment(102, &href, Some(&b), "C");
    bob.comment(103, &href, Some("hd://nowhere/comments/1.md"), "orphan");

    let threads = world.ctx.comments().thread(&href, &ThreadOpts::default()).unwrap();
    assert_eq!(threads.len(), 1);
    let root = &threads[0];
    assert_eq!(root.comment.url, a);
    let reply = &root.replies.as_ref().unwrap()[0];
    assert_eq!(reply.comment.url, b);
    assert_eq!(reply.replies.as_ref().unwrap()[0].comment.url, c);

    let shallow = world
        .ctx
        .comments()
        .thread(
            &href,
            &ThreadOpts {
                depth: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(shallow[0].replies.as_ref().unwrap()[0].replies.is_none());

    let rerooted = world
        .ctx
        .comments()
        .thread(
            &href,
            &ThreadOpts {
                parent: Some(a.clone()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(rerooted.len(), 1);
    assert_eq!(rerooted[0].comment.url, b);
}

#[test]
fn comment_counts_are_cached_until_bypassed() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let href = world.user_post_url(1);
    let filter = CommentFilter {
        href: Some(href.clone()),
        ..Default::default()
    };

    bob.comment(100, &href, None, "one");
    assert_eq!(world.ctx.comments().count(&filter, CountOpts::default()).unwrap(), 1);

    bob.comment(101, &href, None, "two");
    assert_eq!(world.ctx.comments().count(&filter, CountOpts::default()).unwrap(), 1);
    assert_eq!(
        world
            .ctx
            .comments()
            .count(&filter, CountOpts { no_cache: true })
            .unwrap(),
        2
    );

    // Local writes invalidate the combined listing.
    world
        .ctx
        .comments()
        .add(&NewComment {
            href: href.clone(),
            parent: None,
            content: "three".into(),
        })
        .unwrap();
    assert_eq!(world.ctx.comments().count(&filter, CountOpts::default()).unwrap(), 3);
}

#[test]
fn own_comments_can_be_updated_and_removed() {
    let world = World::new();
    let bob = world.peer("Bob");
    let href = world.user_post_url(1);
    let mine = CommentFilter {
        author: Some(world.user.clone()),
        ..Default::default()
    };

    let url = world
        .ctx
        .comments()
        .add(&NewComment {
            href: href.clone(),
            parent: None,
            content: "first".into(),
        })
        .unwrap();

    world.ctx.comments().update(&url, "second").unwrap();
    let listed = world.ctx.comments().list(&mine, &ListOpts::default()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content, "second");
    assert_eq!(listed[0].href, href);

    let theirs = bob.comment(100, &href, None, "bob");
    let err = world.ctx.comments().update(&theirs, "hijack").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let filename = url.rsplit('/').next().unwrap().to_string();
    world.ctx.comments().remove(&filename).unwrap();
    assert!(world.ctx.comments().list(&mine, &ListOpts::default()).unwrap().is_empty());
}

#[test]
fn empty_comments_are_rejected() {
    let world = World::new();
    let err = world
        .ctx
        .comments()
        .add(&NewComment {
            href: world.user_post_url(1),
            parent: None,
            content: "   ".into(),
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

#[test]
fn last_vote_per_voter_wins() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let href = world.user_post_url(1);

    bob.vote(1000, &href, 1);
    bob.vote(1001, &href, -1);
    bob.vote(1002, &href, 1);

    let tally = world
        .ctx
        .votes()
        .tabulate(&href, &VoteFilter::default(), TabulateOpts::default())
        .unwrap();
    assert_eq!(tally.upvotes, vec![bob.key.clone()]);
    assert!(tally.downvotes.is_empty());
}

#[test]
fn put_replaces_and_zero_clears() {
    let world = World::new();
    let href = world.user_post_url(1);
    let fresh = TabulateOpts {
        no_cache: true,
        ..Default::default()
    };
    let votes = world.ctx.votes();

    votes.put(&href, 1).unwrap();
    votes.put(&href, -1).unwrap();
    let own = votes
        .list(&VoteFilter {
            author: Some(world.user.clone()),
            href: Some(href.clone()),
        })
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].vote, -1);

    votes.put(&href, 1).unwrap();
    let tally = votes.tabulate(&href, &VoteFilter::default(), fresh).unwrap();
    assert_eq!(tally.upvotes, vec![world.user.clone()]);
    assert_eq!(votes.get(&href).unwrap().unwrap().vote, 1);

    votes.put(&href, 0).unwrap();
    let tally = votes.tabulate(&href, &VoteFilter::default(), fresh).unwrap();
    assert!(tally.upvotes.is_empty());
    assert!(tally.downvotes.is_empty());
    assert!(votes.get(&href).unwrap().is_none());
}

#[test]
fn votes_can_target_another_drive() {
    let world = World::new();
    let side = world.network.create_drive(Manifest::titled("Side"));
    let href = world.user_post_url(1);
    let votes = world.ctx.votes();
    let by_side = VoteFilter {
        author: Some(side.clone()),
        href: Some(href.clone()),
    };

    votes.put_in(&href, 1, Some(&side)).unwrap();
    votes.put_in(&href, -1, Some(&side)).unwrap();
    let recorded = votes.list(&by_side).unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].author, side);
    assert_eq!(recorded[0].vote, -1);
    assert!(votes.get(&href).unwrap().is_none());

    votes.put_in(&href, 0, Some(&side)).unwrap();
    assert!(votes.list(&by_side).unwrap().is_empty());

    votes.put_in(&href, 1, Some(&world.user)).unwrap();
    assert_eq!(votes.get(&href).unwrap().unwrap().vote, 1);
}

#[test]
fn tabulation_cache_is_bypassable() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let href = world.user_post_url(1);

    bob.vote(1000, &href, 1);
    let votes = world.ctx.votes();
    let cached = votes
        .tabulate(&href, &VoteFilter::default(), TabulateOpts::default())
        .unwrap();
    assert_eq!(cached.upvotes.len(), 1);

    bob.vote(1001, &href, -1);
    let stale = votes
        .tabulate(&href, &VoteFilter::default(), TabulateOpts::default())
        .unwrap();
    assert_eq!(stale.upvotes.len(), 1);

    let fresh = votes
        .tabulate(
            &href,
            &VoteFilter::default(),
            TabulateOpts {
                no_cache: true,
                include_profiles: true,
            },
        )
        .unwrap();
    assert!(fresh.upvotes.is_empty());
    assert_eq!(fresh.downvotes, vec![bob.key.clone()]);
    assert_eq!(fresh.profiles.len(), 1);
    assert_eq!(fresh.profiles[0].title, "Bob");
}

#[test]
fn invalid_votes_are_rejected() {
    let world = World::new();
    let votes = world.ctx.votes();
    assert!(matches!(
        votes.put(&world.user_post_url(1), 2).unwrap_err(),
        Error::Validation(_)
    ));
    assert!(matches!(votes.put("nope", 1).unwrap_err(), Error::Validation(_)));
}
