///Links of an image based lighting chain. Each link is derived from the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChainLink {
    ///The source environment map.
    Base = 0,
    ///Diffuse irradiance, convolved from [Base](Self::Base).
    Irradiance = 1,
    ///Specular prefiltered mip chain, convolved from [Base](Self::Base).
    Prefiltered = 2,
}

impl ChainLink {
    pub const ALL: [Self; 3] = [Self::Base, Self::Irradiance, Self::Prefiltered];

    ///The link that follows `self`, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Base => Some(Self::Irradiance),
            Self::Irradiance => Some(Self::Prefiltered),
            Self::Prefiltered => None,
        }
    }
}

///Owns one value per [ChainLink]. Usually the values are image handles of an [Rm](crate::Rm), so removing the chain
/// is just removing each handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureChain<T> {
    links: [Option<T>; 3],
}

impl<T> TextureChain<T> {
    pub fn new() -> Self {
        TextureChain {
            links: [None, None, None],
        }
    }

    ///Sets `link` to `value`, returns the old value.
    pub fn insert(&mut self, link: ChainLink, value: T) -> Option<T> {
        self.links[link as usize].replace(value)
    }

    pub fn get(&self, link: ChainLink) -> Option<&T> {
        self.links[link as usize].as_ref()
    }

    pub fn get_mut(&mut self, link: ChainLink) -> Option<&mut T> {
        self.links[link as usize].as_mut()
    }

    pub fn remove(&mut self, link: ChainLink) -> Option<T> {
        self.links[link as usize].take()
    }

    ///Value of the link after `link`.
    pub fn next(&self, link: ChainLink) -> Option<&T> {
        self.get(link.next()?)
    }

    ///All present links in chain order.
    pub fn iter(&self) -> impl Iterator<Item = (ChainLink, &T)> {
        ChainLink::ALL
            .into_iter()
            .filter_map(move |link| self.get(link).map(|v| (link, v)))
    }

    ///Removes every link, in chain order.
    pub fn drain(&mut self) -> impl Iterator<Item = (ChainLink, T)> + '_ {
        ChainLink::ALL
            .into_iter()
            .filter_map(move |link| self.remove(link).map(|v| (link, v)))
    }

    pub fn len(&self) -> usize {
        self.links.iter().filter(|l| l.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    ///True if every link is present.
    pub fn is_complete(&self) -> bool {
        self.links.iter().all(Option::is_some)
    }
}

impl<T> Default for TextureChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostRm, ImageDesc, RmDesc, track::ResState};
    use marrow::ash::vk::{self, Handle as _};

    #[test]
    fn links_in_order() {
        let mut chain = TextureChain::new();
        assert!(chain.is_empty());
        chain.insert(ChainLink::Prefiltered, "prefiltered");
        chain.insert(ChainLink::Base, "base");
        assert_eq!(chain.len(), 2);
        assert!(!chain.is_complete());
        assert_eq!(chain.next(ChainLink::Base), None);

        assert_eq!(chain.insert(ChainLink::Irradiance, "irr"), None);
        assert_eq!(chain.insert(ChainLink::Irradiance, "irradiance"), Some("irr"));
        assert!(chain.is_complete());
        assert_eq!(chain.next(ChainLink::Base), Some(&"irradiance"));
        assert_eq!(chain.next(ChainLink::Prefiltered), None);
        assert_eq!(
            chain.iter().map(|(l, _)| l).collect::<Vec<_>>(),
            ChainLink::ALL.to_vec()
        );
    }

    #[test]
    fn chain_of_rm_images() {
        let mut rm = HostRm::new_host(&RmDesc::default()).unwrap();
        let mut chain = TextureChain::new();
        for (i, link) in ChainLink::ALL.into_iter().enumerate() {
            let desc = ImageDesc::color_2d(
                vk::Image::from_raw(i as u64 + 1),
                vk::ImageView::from_raw(i as u64 + 1),
                vk::ImageUsageFlags::SAMPLED,
            )
            .with_layers(6);
            let handle = rm.add_image(desc, ResState::Undefined).unwrap();
            chain.insert(link, handle);
        }

        let handles = chain.drain().map(|(_, h)| h).collect::<Vec<_>>();
        assert!(chain.is_empty());
        for h in handles {
            rm.remove_image(h).unwrap();
        }
        assert!(rm.images().is_empty());
        assert_eq!(rm.drain_released().count(), 3);
    }
}
