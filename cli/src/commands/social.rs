use std::path::{Path, PathBuf};

use uuid::Uuid;
use venered_cli::{OutputFormatter, Result};
use venered_link::{
    FollowService, FriendshipService, ImageCategory, MessagingService, PostService,
};

use crate::connect::Connected;

pub async fn follow(connected: &Connected, formatter: &OutputFormatter, user: Uuid) -> Result<()> {
    FollowService::new(connected.auth.clone(), connected.backend.clone())
        .follow(user)
        .await?;
    println!("{}", formatter.format_success(&format!("Now following {}", user)));
    Ok(())
}

pub async fn unfollow(connected: &Connected, formatter: &OutputFormatter, user: Uuid) -> Result<()> {
    let removed = FollowService::new(connected.auth.clone(), connected.backend.clone())
        .unfollow(user)
        .await?;
    let message = if removed {
        format!("Unfollowed {}", user)
    } else {
        format!("You were not following {}", user)
    };
    println!("{}", formatter.format_success(&message));
    Ok(())
}

pub async fn friends(connected: &Connected, formatter: &OutputFormatter) -> Result<()> {
    let friends = FriendshipService::new(connected.auth.clone(), connected.backend.clone())
        .friends()
        .await?;
    println!("{}", formatter.format_profiles(&friends, "No friends yet"));
    Ok(())
}

/// Upload the optional image first, then send.
pub async fn send(
    connected: &Connected,
    formatter: &OutputFormatter,
    user: Uuid,
    text: &str,
    image: Option<&Path>,
) -> Result<()> {
    let image_url = match image {
        Some(path) => Some(
            connected
                .client
                .uploader()
                .upload_file(path, ImageCategory::Messages)
                .await?,
        ),
        None => None,
    };

    let delivery = MessagingService::new(connected.auth.clone(), connected.backend.clone())
        .send(user, text, image_url)
        .await?;
    println!("{}", formatter.format_delivery(&delivery));
    Ok(())
}

/// Upload every image in order, then publish.
pub async fn post(
    connected: &Connected,
    formatter: &OutputFormatter,
    text: &str,
    images: &[PathBuf],
) -> Result<()> {
    let mut image_urls = Vec::with_capacity(images.len());
    for path in images {
        image_urls.push(
            connected
                .client
                .uploader()
                .upload_file(path, ImageCategory::Posts)
                .await?,
        );
    }

    let post = PostService::new(connected.auth.clone(), connected.backend.clone())
        .create(text, &image_urls)
        .await?;
    println!("{}", formatter.format_success(&format!("Published post {}", post.id)));
    Ok(())
}

pub async fn search(connected: &Connected, formatter: &OutputFormatter, term: &str) -> Result<()> {
    let profiles = PostService::new(connected.auth.clone(), connected.backend.clone())
        .search_profiles(term)
        .await?;
    println!("{}", formatter.format_profiles(&profiles, "No matching users"));
    Ok(())
}
